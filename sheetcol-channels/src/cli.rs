//! CLI channel adapter for interactive terminal sessions.
//!
//! Lines read from stdin become messages. `/load <path>...` submits local
//! files as one document message; result files are written to the output
//! directory instead of being printed.

use crate::message::{
    Attachment, ChannelMessage, ChannelType, MessageContent, OutgoingContent, OutgoingMessage,
};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::{self, AsyncBufReadExt, BufReader};

const FILE_URL_PREFIX: &str = "file://";

/// CLI channel - stdin/stdout plus local files.
pub struct CliChannel {
    output_dir: PathBuf,
    user_id: String,
}

impl CliChannel {
    /// Create a new CLI channel writing results into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, user_id: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            user_id: user_id.into(),
        }
    }

    /// Turn one input line into a message. Blank lines give `None`.
    pub fn parse_line(&self, line: &str) -> Option<ChannelMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let (content, attachments) = match line.strip_prefix("/load") {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
                let attachments: Vec<Attachment> = rest
                    .split_whitespace()
                    .map(|path| {
                        let filename = Path::new(path)
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned());
                        Attachment::document(format!("{FILE_URL_PREFIX}{path}"), filename)
                    })
                    .collect();
                (MessageContent::Document { caption: None }, attachments)
            }
            _ => (
                MessageContent::Text {
                    text: line.to_string(),
                },
                vec![],
            ),
        };

        Some(ChannelMessage {
            id: uuid::Uuid::new_v4().to_string(),
            channel_type: ChannelType::Cli,
            channel_id: "cli".to_string(),
            user_id: self.user_id.clone(),
            content,
            attachments,
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new(".", "local")
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                ChannelError::Internal(format!(
                    "cannot create output directory {}: {e}",
                    self.output_dir.display()
                ))
            })
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        match message.content {
            OutgoingContent::Text { text } => {
                println!("{text}");
                Ok(uuid::Uuid::new_v4().to_string())
            }
            OutgoingContent::File {
                data,
                filename,
                caption,
            } => {
                // Only the final path component, so replies cannot escape output_dir.
                let name = Path::new(&filename)
                    .file_name()
                    .ok_or_else(|| ChannelError::InvalidMessage(format!("bad filename: {filename}")))?;
                let path = self.output_dir.join(name);

                tokio::fs::write(&path, &data)
                    .await
                    .map_err(|e| ChannelError::SendFailed(format!("{}: {e}", path.display())))?;

                if let Some(cap) = caption {
                    println!("{cap}");
                }
                println!("[Saved {}]", path.display());
                tracing::info!(path = %path.display(), size_bytes = data.len(), "Result file written");

                Ok(path.display().to_string())
            }
        }
    }

    async fn fetch_attachment(&self, attachment: &Attachment) -> ChannelResult<Vec<u8>> {
        let path = attachment
            .url
            .strip_prefix(FILE_URL_PREFIX)
            .unwrap_or(&attachment.url);

        tokio::fs::read(path)
            .await
            .map_err(|e| ChannelError::DownloadFailed(format!("{path}: {e}")))
    }

    async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static,
    {
        let stdin = io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let trimmed = line.trim();
            if trimmed == "/quit" || trimmed == "/exit" {
                break;
            }

            if let Some(msg) = self.parse_line(trimmed) {
                callback(msg);
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}
