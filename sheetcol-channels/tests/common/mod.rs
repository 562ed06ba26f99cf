//! Shared fixtures: xlsx builders and an in-memory channel.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_xlsxwriter::Workbook;
use sheetcol_channels::{
    Attachment, Channel, ChannelError, ChannelMessage, ChannelResult, ChannelType,
    MessageContent, OutgoingContent, OutgoingMessage,
};
use tokio::sync::Mutex;

/// Single-column workbook: a header followed by text values.
pub fn column(header: &str, values: &[&str]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, header).unwrap();
    for (i, value) in values.iter().enumerate() {
        if !value.is_empty() {
            sheet.write_string(i as u32 + 1, 0, *value).unwrap();
        }
    }
    workbook.save_to_buffer().unwrap()
}

/// Channel that serves attachments from memory and records what it sends.
#[derive(Default)]
pub struct MockChannel {
    files: HashMap<String, Vec<u8>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    reject_files: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `bytes` downloadable under `url`.
    pub fn with_file(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), bytes);
        self
    }

    /// Make every file send fail (text still goes through) until switched back.
    pub fn reject_files(&self, reject: bool) {
        self.reject_files.store(reject, Ordering::SeqCst);
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub async fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().await.clone()
    }

    /// Sent messages addressed to `chat`.
    pub async fn sent_to(&self, chat: &str) -> Vec<OutgoingMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.channel_id == chat)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        let is_file = matches!(message.content, OutgoingContent::File { .. });
        if is_file && self.reject_files.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed("Request Entity Too Large".into()));
        }
        self.sent.lock().await.push(message);
        Ok("sent".into())
    }

    async fn fetch_attachment(&self, attachment: &Attachment) -> ChannelResult<Vec<u8>> {
        self.files
            .get(&attachment.url)
            .cloned()
            .ok_or_else(|| ChannelError::DownloadFailed(attachment.url.clone()))
    }

    async fn listen<F>(&self, _callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static,
    {
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}

/// Text message from `user`, replies go to chat `chat-<user>`.
pub fn text(user: &str, text: &str) -> ChannelMessage {
    ChannelMessage {
        id: uuid::Uuid::new_v4().to_string(),
        channel_type: ChannelType::Telegram,
        channel_id: format!("chat-{user}"),
        user_id: user.to_string(),
        content: MessageContent::Text { text: text.into() },
        attachments: vec![],
        metadata: HashMap::new(),
        timestamp: 0,
    }
}

/// Document message from `user` carrying `(url, filename)` attachments.
pub fn documents(user: &str, files: &[(&str, &str)]) -> ChannelMessage {
    let mut msg = text(user, "");
    msg.content = MessageContent::Document { caption: None };
    msg.attachments = files
        .iter()
        .map(|(url, name)| Attachment::document(*url, Some((*name).to_string())))
        .collect();
    msg
}

/// Text of a reply, panicking on file replies.
pub fn reply_text(message: &OutgoingMessage) -> &str {
    message.text().expect("expected a text reply")
}

/// `(data, filename, caption)` of a file reply.
pub fn reply_file(message: &OutgoingMessage) -> (String, &str, Option<&str>) {
    match &message.content {
        OutgoingContent::File {
            data,
            filename,
            caption,
        } => (
            String::from_utf8(data.clone()).unwrap(),
            filename.as_str(),
            caption.as_deref(),
        ),
        OutgoingContent::Text { text } => panic!("expected a file reply, got text: {text}"),
    }
}
