//! What the bot receives and what it sends back, independent of transport.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Telegram,
    Cli,
}

impl ChannelType {
    /// Prefix of session keys and the `channel` log field.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Cli => "cli",
        }
    }
}

/// One user message, already translated out of the transport's format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Transport's id for the message
    pub id: String,
    pub channel_type: ChannelType,
    /// Where replies go (Telegram chat id, terminal name)
    pub channel_id: String,
    /// Sender; sessions are keyed on it
    pub user_id: String,
    pub content: MessageContent,
    /// Uploaded files
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Transport extras (username, update id)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Receive time, Unix millis
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Plain text message, including commands
    Text { text: String },
    /// One or more uploaded documents, listed in `attachments`
    Document { caption: Option<String> },
}

/// File attached to an incoming message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub attachment_type: AttachmentType,
    /// Channel-specific locator understood by [`crate::Channel::fetch_attachment`]
    pub url: String,
    /// Filename as the user sent it
    pub filename: Option<String>,
    /// As reported by the sender's client
    pub mime_type: Option<String>,
    /// Size in bytes, when the channel reports it up front
    pub size_bytes: Option<u64>,
}

impl Attachment {
    /// A document attachment.
    pub fn document(url: impl Into<String>, filename: Option<String>) -> Self {
        Self {
            attachment_type: AttachmentType::Document,
            url: url.into(),
            filename,
            mime_type: None,
            size_bytes: None,
        }
    }

    /// Filename to show the user.
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("document")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    Document,
    Other,
}

/// A reply, addressed to the chat the message came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub channel_type: ChannelType,
    pub channel_id: String,
    /// Message being answered
    pub reply_to: Option<String>,
    pub content: OutgoingContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingContent {
    /// Plain text, sent without any markup parsing
    Text { text: String },
    /// File generated in memory
    File {
        data: Vec<u8>,
        filename: String,
        caption: Option<String>,
    },
}

impl OutgoingMessage {
    /// Plain text reply to `message`.
    pub fn reply_text(message: &ChannelMessage, text: impl Into<String>) -> Self {
        Self {
            channel_type: message.channel_type,
            channel_id: message.channel_id.clone(),
            reply_to: Some(message.id.clone()),
            content: OutgoingContent::Text { text: text.into() },
        }
    }

    /// File reply to `message`.
    pub fn reply_file(
        message: &ChannelMessage,
        data: Vec<u8>,
        filename: impl Into<String>,
        caption: Option<String>,
    ) -> Self {
        Self {
            channel_type: message.channel_type,
            channel_id: message.channel_id.clone(),
            reply_to: Some(message.id.clone()),
            content: OutgoingContent::File {
                data,
                filename: filename.into(),
                caption,
            },
        }
    }

    /// Text of a text reply; `None` for files.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            OutgoingContent::Text { text } => Some(text),
            OutgoingContent::File { .. } => None,
        }
    }
}

impl ChannelMessage {
    /// Text of a text message; `None` for documents.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            MessageContent::Document { .. } => None,
        }
    }

    /// Command name and arguments, if the text starts with `/`.
    ///
    /// The `@botname` suffix Telegram adds in group chats is dropped and the
    /// name is lowercased: `/Process@sheet_bot now` gives `("process", "now")`.
    pub fn command(&self) -> Option<(String, &str)> {
        let text = self.text()?.trim_start();
        let rest = text.strip_prefix('/')?;

        let (word, args) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(word, args)| (word, args.trim()));
        let name = word.split('@').next().unwrap_or(word);
        if name.is_empty() {
            return None;
        }

        Some((name.to_lowercase(), args))
    }

    /// Session key: one session per user per channel.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel_type.as_str(), self.user_id)
    }

    /// Whether the user uploaded files rather than typing.
    pub const fn is_document(&self) -> bool {
        matches!(self.content, MessageContent::Document { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(text: &str) -> ChannelMessage {
        ChannelMessage {
            id: "1".into(),
            channel_type: ChannelType::Telegram,
            channel_id: "100".into(),
            user_id: "42".into(),
            content: MessageContent::Text { text: text.into() },
            attachments: vec![],
            metadata: HashMap::new(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(
            text_message("/process").command(),
            Some(("process".to_string(), ""))
        );
        assert_eq!(
            text_message("/Process@sheet_bot  now ").command(),
            Some(("process".to_string(), "now"))
        );
        assert_eq!(
            text_message("/load a.xlsx b.xlsx").command(),
            Some(("load".to_string(), "a.xlsx b.xlsx"))
        );
        assert_eq!(text_message("hello").command(), None);
        assert_eq!(text_message("/").command(), None);
    }

    #[test]
    fn test_session_key() {
        assert_eq!(text_message("hi").session_key(), "telegram:42");
    }

    #[test]
    fn test_channel_message_serialization() {
        let mut msg = text_message("hi");
        msg.content = MessageContent::Document { caption: None };
        msg.attachments
            .push(Attachment::document("telegram://file/abc", Some("a.xlsx".into())));

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"telegram\""));
        assert!(json.contains("\"document\""));

        let parsed: ChannelMessage = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_document());
        assert_eq!(parsed.attachments[0].display_name(), "a.xlsx");
    }

    #[test]
    fn test_reply_constructors() {
        let msg = text_message("hi");
        let reply = OutgoingMessage::reply_text(&msg, "hello");
        assert_eq!(reply.channel_id, "100");
        assert_eq!(reply.reply_to.as_deref(), Some("1"));
        assert_eq!(reply.text(), Some("hello"));

        let file = OutgoingMessage::reply_file(&msg, b"x".to_vec(), "out.txt", None);
        assert!(file.text().is_none());
    }
}
