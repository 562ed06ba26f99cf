//! Seams between transports and the bot logic.

use crate::message::{Attachment, ChannelMessage, OutgoingMessage};
use async_trait::async_trait;

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Transport failure, as seen by the bot.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The transport rejected our credentials.
    #[error("transport rejected credentials: {0}")]
    Auth(String),

    #[error("transport unreachable: {0}")]
    Connection(String),

    #[error("could not deliver reply: {0}")]
    SendFailed(String),

    #[error("could not fetch attachment: {0}")]
    DownloadFailed(String),

    /// The message or attachment does not belong to this transport.
    #[error("unusable message: {0}")]
    InvalidMessage(String),

    #[error("transport not ready")]
    NotReady,

    #[error("{0}")]
    Internal(String),
}

/// A transport the bot talks through (Telegram, local terminal, ...).
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short name used in session keys and logs.
    fn name(&self) -> &'static str;

    /// Verify credentials or prepare local resources before use.
    async fn init(&mut self) -> ChannelResult<()>;

    /// Deliver a reply. Returns the transport's id for the sent message.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String>;

    /// Bytes of a file the user sent.
    async fn fetch_attachment(&self, attachment: &Attachment) -> ChannelResult<Vec<u8>>;

    /// Pull incoming messages and pass each to `callback`, until the
    /// source ends or fails.
    async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static;

    async fn health_check(&self) -> ChannelResult<()>;

    async fn shutdown(&self) -> ChannelResult<()>;
}

/// Turns one incoming message into the replies to send back.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: ChannelMessage) -> ChannelResult<Vec<OutgoingMessage>>;
}
