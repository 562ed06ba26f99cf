//! Telegram channel adapter.
//!
//! Provides the `TelegramChannel` implementation for receiving and sending
//! messages through the Telegram Bot API. Updates arrive either by long
//! polling (`listen`) or through the webhook route, and both paths go through
//! [`TelegramChannel::parse_update`].

use crate::message::{
    Attachment, AttachmentType, ChannelMessage, ChannelType, MessageContent, OutgoingContent,
    OutgoingMessage,
};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use sheetcol_common::util::redact_secret;
use std::collections::HashMap;
use std::time::Duration;

/// Public Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects longer text messages.
const MAX_MESSAGE_LEN: usize = 4096;

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Attachment URL scheme for files still on Telegram's servers.
const FILE_URL_PREFIX: &str = "telegram://file/";

// ============================================================================
// Telegram Channel
// ============================================================================

/// Telegram channel - talks to the Bot API over HTTPS.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
    api_base: String,
    poll_timeout_secs: u64,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            poll_timeout_secs: 30,
        }
    }

    /// Point the channel at a different Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Long-poll timeout used by `getUpdates`.
    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{file_path}", self.api_base, self.bot_token)
    }

    /// Whether `token` is this bot's token. Used to authenticate webhook calls.
    pub fn token_matches(&self, token: &str) -> bool {
        let expected = self.bot_token.as_bytes();
        let given = token.as_bytes();
        expected.len() == given.len()
            && expected
                .iter()
                .zip(given)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    /// Strip the bot token from text that may have embedded a request URL.
    fn redact(&self, text: &str) -> String {
        redact_secret(text, &self.bot_token)
    }

    fn http_error(&self, e: &reqwest::Error) -> String {
        self.redact(&e.to_string())
    }

    fn is_user_allowed(&self, identity: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == identity)
    }

    fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        identities.into_iter().any(|id| self.is_user_allowed(id))
    }

    /// POST a Bot API method and return its `result` field.
    async fn call(&self, method: &str, body: &Value) -> anyhow::Result<Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Telegram {method} request failed: {}", self.http_error(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram {method} failed ({status}): {err}");
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Telegram {method} returned invalid JSON: {}", self.http_error(&e)))?;

        if data.get("ok").and_then(Value::as_bool) == Some(false) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("Telegram {method} failed: {description}");
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Download a file from Telegram by its `file_id`.
    pub async fn download_file(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        // Step 1: Get the file path via getFile API
        let result = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await?;
        let file_path = result
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Missing file_path in getFile response"))?;

        // Step 2: Download the file
        let file_resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Telegram file download failed: {}", self.http_error(&e)))?;

        if !file_resp.status().is_success() {
            anyhow::bail!(
                "Failed to download file from Telegram: {}",
                file_resp.status()
            );
        }

        let bytes = file_resp
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("Telegram file download failed: {}", self.http_error(&e)))?;
        Ok(bytes.to_vec())
    }

    /// Send a document from bytes (in-memory) to a Telegram chat.
    pub async fn send_document_bytes(
        &self,
        chat_id: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        let size = file_bytes.len();
        let part = Part::bytes(file_bytes)
            .file_name(file_name.to_string())
            .mime_str("text/plain; charset=utf-8")?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);

        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Telegram sendDocument request failed: {}", self.http_error(&e)))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendDocument failed: {err}");
        }

        tracing::info!(chat_id = %chat_id, file = %file_name, size_bytes = size, "Telegram document sent");
        Ok(())
    }

    /// Send plain text, split into chunks Telegram accepts.
    pub async fn send_text(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            self.call(
                "sendMessage",
                &serde_json::json!({ "chat_id": chat_id, "text": chunk }),
            )
            .await?;
        }
        Ok(())
    }

    /// Register `url` as the webhook for this bot.
    pub async fn set_webhook(&self, url: &str) -> anyhow::Result<()> {
        self.call(
            "setWebhook",
            &serde_json::json!({ "url": url, "allowed_updates": ["message"] }),
        )
        .await?;
        tracing::info!(url = %self.redact(url), "Telegram webhook registered");
        Ok(())
    }

    /// Remove any registered webhook so `getUpdates` works.
    pub async fn delete_webhook(&self) -> anyhow::Result<()> {
        self.call("deleteWebhook", &serde_json::json!({})).await?;
        Ok(())
    }

    /// Fetch one batch of updates starting at `offset`.
    async fn get_updates(&self, offset: i64) -> anyhow::Result<Vec<Value>> {
        let result = self
            .call(
                "getUpdates",
                &serde_json::json!({
                    "offset": offset,
                    "timeout": self.poll_timeout_secs,
                    "allowed_updates": ["message"]
                }),
            )
            .await?;

        match result {
            Value::Array(updates) => Ok(updates),
            _ => Ok(Vec::new()),
        }
    }

    /// Convert a Bot API update into a channel message.
    ///
    /// Returns `None` for updates the bot does not act on: non-message
    /// updates, message kinds other than text and documents, and messages from
    /// users outside `allowed_users`.
    pub fn parse_update(&self, update: &Value) -> Option<ChannelMessage> {
        let message = update.get("message")?;

        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)?
            .to_string();

        let from = message.get("from");
        let username = from
            .and_then(|f| f.get("username"))
            .and_then(Value::as_str);
        let user_id = from
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)
            .map(|id| id.to_string());

        let mut identities: Vec<&str> = Vec::with_capacity(2);
        if let Some(name) = username {
            identities.push(name);
        }
        if let Some(id) = &user_id {
            identities.push(id);
        }

        if !self.is_any_user_allowed(identities.iter().copied()) {
            tracing::warn!(
                username = username.unwrap_or("unknown"),
                "Telegram: ignoring message from unauthorized user"
            );
            return None;
        }

        let (content, attachments) = if let Some(text) = message.get("text").and_then(Value::as_str) {
            (
                MessageContent::Text {
                    text: text.to_string(),
                },
                vec![],
            )
        } else if let Some(doc) = message.get("document") {
            let file_id = doc.get("file_id").and_then(Value::as_str)?;
            let attachment = Attachment {
                attachment_type: AttachmentType::Document,
                url: format!("{FILE_URL_PREFIX}{file_id}"),
                filename: doc
                    .get("file_name")
                    .and_then(Value::as_str)
                    .map(String::from),
                mime_type: doc
                    .get("mime_type")
                    .and_then(Value::as_str)
                    .map(String::from),
                size_bytes: doc.get("file_size").and_then(Value::as_u64),
            };
            let caption = message
                .get("caption")
                .and_then(Value::as_str)
                .map(String::from);
            (MessageContent::Document { caption }, vec![attachment])
        } else {
            tracing::debug!(chat_id = %chat_id, "Telegram: ignoring unsupported message kind");
            return None;
        };

        let mut metadata = HashMap::new();
        if let Some(name) = username {
            metadata.insert("username".to_string(), name.to_string());
        }
        if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
            metadata.insert("update_id".to_string(), update_id.to_string());
        }

        let msg = ChannelMessage {
            id: message
                .get("message_id")
                .and_then(Value::as_i64)
                .map_or_else(|| uuid::Uuid::new_v4().to_string(), |id| id.to_string()),
            channel_type: ChannelType::Telegram,
            channel_id: chat_id,
            user_id: user_id.unwrap_or_else(|| username.unwrap_or("unknown").to_string()),
            content,
            attachments,
            metadata,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        tracing::info!(
            channel = "telegram",
            message_id = %msg.id,
            chat_id = %msg.channel_id,
            user_id = %msg.user_id,
            message_type = if msg.is_document() { "document" } else { "text" },
            "IM message received"
        );

        Some(msg)
    }
}

/// Split a message into chunks that fit within Telegram's limit.
fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }

        let chunk = &remaining[..boundary];
        let split_pos = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&pos| pos > 0)
            .unwrap_or(boundary);

        chunks.push(remaining[..split_pos].to_string());
        remaining = remaining[split_pos..].trim_start();
    }

    chunks
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        // Verify bot token by calling getMe
        let me = self
            .call("getMe", &serde_json::json!({}))
            .await
            .map_err(|e| ChannelError::Auth(format!("Invalid bot token: {e}")))?;

        let bot_name = me.get("username").and_then(Value::as_str).unwrap_or("unknown");
        tracing::info!(bot = %bot_name, "Telegram channel initialized");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        match message.content {
            OutgoingContent::Text { text } => {
                self.send_text(&message.channel_id, &text)
                    .await
                    .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
            }
            OutgoingContent::File {
                data,
                filename,
                caption,
            } => {
                self.send_document_bytes(&message.channel_id, data, &filename, caption.as_deref())
                    .await
                    .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
            }
        }

        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn fetch_attachment(&self, attachment: &Attachment) -> ChannelResult<Vec<u8>> {
        let file_id = attachment
            .url
            .strip_prefix(FILE_URL_PREFIX)
            .ok_or_else(|| ChannelError::InvalidMessage(format!("not a Telegram file: {}", attachment.url)))?;

        self.download_file(file_id)
            .await
            .map_err(|e| ChannelError::DownloadFailed(e.to_string()))
    }

    async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static,
    {
        // getUpdates is refused while a webhook is registered.
        if let Err(e) = self.delete_webhook().await {
            tracing::warn!("Telegram deleteWebhook failed: {e}");
        }

        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            for update in &updates {
                if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                    offset = uid + 1;
                }

                if let Some(msg) = self.parse_update(update) {
                    callback(msg);
                }
            }
        }
    }

    async fn health_check(&self) -> ChannelResult<()> {
        self.call("getMe", &serde_json::json!({}))
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::debug!("Telegram health check failed: {e}");
                ChannelError::NotReady
            })
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}
