//! Bot conversation logic.
//!
//! Maps commands and uploaded documents onto the session aggregator and turns
//! the results into replies, which the dispatcher delivers. The one exception
//! is the result file of `/process`: the handler sends it itself, so the
//! session is only emptied once the file is out.

use std::sync::Arc;

use async_trait::async_trait;
use sheetcol_common::util::{format_bytes, preview};
use sheetcol_common::ExtractionConfig;
use sheetcol_core::{
    FileOutcome, ParseError, SessionAggregator, SessionId, SessionStats, SpreadsheetUpload,
};

use crate::message::{Attachment, ChannelMessage, OutgoingMessage};
use crate::traits::{Channel, ChannelResult, MessageHandler};

const NO_FILES_TEXT: &str = "Send spreadsheet files first!";

const RESULT_NOT_SENT_TEXT: &str = "The result file could not be sent. \
    Your files are kept; send /process to try again.";

const NO_DATA_TEXT: &str = "No data could be extracted from the files received so far. \
    Check that the values are in the first column below a header row, \
    or send /reset to start over.";

/// Handles the bot commands and spreadsheet uploads of every session.
pub struct BotHandler<C> {
    channel: Arc<C>,
    aggregator: Arc<SessionAggregator>,
    extraction: ExtractionConfig,
}

impl<C: Channel> BotHandler<C> {
    pub fn new(
        channel: Arc<C>,
        aggregator: Arc<SessionAggregator>,
        extraction: ExtractionConfig,
    ) -> Self {
        Self {
            channel,
            aggregator,
            extraction,
        }
    }

    /// Aggregator the handler writes into.
    pub fn aggregator(&self) -> &Arc<SessionAggregator> {
        &self.aggregator
    }

    fn session_id(message: &ChannelMessage) -> SessionId {
        SessionId::from(message.session_key())
    }

    fn extensions(&self) -> String {
        self.extraction.accepted_extensions.join(" or ")
    }

    fn start_text(&self) -> String {
        format!(
            "Hi! Send me one or more {} files.\n\
             I will take the values from the first column of each file \
             (the header row is skipped) and collect them into one text file.\n\n\
             When all files are uploaded, send /process.",
            self.extensions()
        )
    }

    fn help_text(&self) -> String {
        format!(
            "Available commands:\n\
             /start - start working with the bot\n\
             /process - build the text file from all received spreadsheets\n\
             /reset - discard the files received so far\n\
             /help - show this help\n\n\
             Send {} files one by one or together, then send /process.",
            self.extensions()
        )
    }

    fn hint_text(&self) -> String {
        format!(
            "Send {} files, then /process to get the result. See /help.",
            self.extensions()
        )
    }

    async fn handle_command(&self, message: &ChannelMessage, name: &str) -> Option<OutgoingMessage> {
        let session = Self::session_id(message);
        tracing::info!(session = %session, command = %name, "Command received");

        let reply = match name {
            "start" => OutgoingMessage::reply_text(message, self.start_text()),
            "help" => OutgoingMessage::reply_text(message, self.help_text()),
            "process" => return self.process(message, &session).await,
            "reset" => {
                self.aggregator.reset(&session).await;
                OutgoingMessage::reply_text(
                    message,
                    "All received files were discarded. You can start sending new files.",
                )
            }
            _ => OutgoingMessage::reply_text(message, self.hint_text()),
        };
        Some(reply)
    }

    /// Send the merged file; `None` when nothing is left to reply.
    async fn process(
        &self,
        message: &ChannelMessage,
        session: &SessionId,
    ) -> Option<OutgoingMessage> {
        let filename = self.extraction.output_filename.clone();
        let outcome = self
            .aggregator
            .finalize_with(session, |finalized| async move {
                let caption = format!(
                    "Done! Extracted {} records from {} files.",
                    finalized.record_count, finalized.file_count
                );
                let file = OutgoingMessage::reply_file(
                    message,
                    finalized.text.into_bytes(),
                    filename,
                    Some(caption),
                );
                self.channel.send(file).await
            })
            .await;

        match outcome {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!(session = %session, error = %e, "Result file not delivered");
                Some(OutgoingMessage::reply_text(message, RESULT_NOT_SENT_TEXT))
            }
            Err(e) if e.file_count == 0 => Some(OutgoingMessage::reply_text(message, NO_FILES_TEXT)),
            Err(e) => {
                tracing::info!(session = %session, files = e.file_count, "Nothing to finalize");
                Some(OutgoingMessage::reply_text(message, NO_DATA_TEXT))
            }
        }
    }

    /// Download the acceptable attachments. Rejected ones get a line in `notes`.
    async fn collect_uploads(
        &self,
        attachments: &[Attachment],
        notes: &mut Vec<String>,
    ) -> Vec<SpreadsheetUpload> {
        let limit = self.extraction.max_file_bytes;
        let mut uploads = Vec::with_capacity(attachments.len());

        for attachment in attachments {
            let name = attachment.display_name();

            if !self.extraction.is_spreadsheet(name) {
                notes.push(format!(
                    "'{name}' skipped: please send a file with the {} extension.",
                    self.extensions()
                ));
                continue;
            }

            if attachment.size_bytes.is_some_and(|size| size > limit) {
                notes.push(too_large(name, limit));
                continue;
            }

            let bytes = match self.channel.fetch_attachment(attachment).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "Attachment download failed");
                    notes.push(format!("Could not download '{name}'. Please send it again."));
                    continue;
                }
            };

            if bytes.len() as u64 > limit {
                notes.push(too_large(name, limit));
                continue;
            }

            uploads.push(SpreadsheetUpload::new(name, bytes));
        }

        uploads
    }

    async fn handle_documents(&self, message: &ChannelMessage) -> OutgoingMessage {
        let session = Self::session_id(message);
        let mut notes = Vec::new();

        let uploads = self.collect_uploads(&message.attachments, &mut notes).await;
        let mut lines = Vec::new();

        if !uploads.is_empty() {
            // Lanes serialize a session's messages, so nothing lands between
            // this snapshot and the batch.
            let mut totals = self.aggregator.stats(&session).await;
            let outcomes = self.aggregator.accept_batch(&session, uploads).await;

            for outcome in &outcomes {
                if let Ok(count) = &outcome.result {
                    totals.record_count += count;
                    totals.file_count += 1;
                }
                lines.push(describe_outcome(outcome, totals));
            }

            if outcomes.iter().any(FileOutcome::is_ok) {
                notes.push("Send another file or /process to get the result.".to_string());
            }
        }

        lines.append(&mut notes);
        OutgoingMessage::reply_text(message, lines.join("\n"))
    }
}

fn too_large(name: &str, limit: u64) -> String {
    format!(
        "'{name}' skipped: files larger than {} are not accepted.",
        format_bytes(limit)
    )
}

/// One reply line per file; `totals` is the session state right after it.
fn describe_outcome(outcome: &FileOutcome, totals: SessionStats) -> String {
    match &outcome.result {
        Ok(count) => format!(
            "File '{}' received: {count} records (total {} from {} files).",
            outcome.filename, totals.record_count, totals.file_count
        ),
        Err(ParseError::Aborted(_)) => format!(
            "Processing of '{}' failed. Please send it again.",
            outcome.filename
        ),
        Err(_) => format!(
            "Could not read '{}' as a spreadsheet. Check the file and send it again.",
            outcome.filename
        ),
    }
}

#[async_trait]
impl<C: Channel + 'static> MessageHandler for BotHandler<C> {
    async fn handle(&self, message: ChannelMessage) -> ChannelResult<Vec<OutgoingMessage>> {
        if message.is_document() {
            if message.attachments.is_empty() {
                return Ok(vec![]);
            }
            return Ok(vec![self.handle_documents(&message).await]);
        }

        let reply = match message.command() {
            Some((name, _)) => self.handle_command(&message, &name).await,
            None => {
                tracing::debug!(
                    user = %message.user_id,
                    text = %preview(message.text().unwrap_or_default(), 64),
                    "Free text received"
                );
                Some(OutgoingMessage::reply_text(&message, self.hint_text()))
            }
        };
        Ok(reply.into_iter().collect())
    }
}
