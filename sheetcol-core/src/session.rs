//! Per-session accumulation of extracted records.
//!
//! Each session moves between two states:
//!
//! ```text
//! EMPTY ──accept──► ACCUMULATING ──accept──► ACCUMULATING
//!   ▲                    │
//!   └──finalize/reset────┘
//! ```
//!
//! Sessions are never destroyed; a finalized session is simply empty again.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::{EmptySessionError, ParseError};
use crate::extract::extract;

/// Separator placed between records in the merged text.
pub const RECORD_SEPARATOR: &str = "\n";

/// Opaque session key chosen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Raw upload handed in by the messaging layer.
#[derive(Debug, Clone)]
pub struct SpreadsheetUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl SpreadsheetUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// Result of one file in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub filename: String,
    /// Records contributed, or why the file contributed nothing.
    pub result: Result<usize, ParseError>,
}

impl FileOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Accumulated records of one session.
#[derive(Debug, Default)]
pub struct SessionState {
    records: Vec<String>,
    file_count: usize,
}

impl SessionState {
    /// Append one file's records.
    pub fn append(&mut self, records: Vec<String>) {
        self.records.extend(records);
        self.file_count += 1;
    }

    pub fn records(&self) -> &[String] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.file_count == 0
    }

    /// Back to EMPTY, keeping the allocation for reuse.
    pub fn clear(&mut self) {
        self.records.clear();
        self.file_count = 0;
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            record_count: self.records.len(),
            file_count: self.file_count,
        }
    }
}

/// Snapshot of a session's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub record_count: usize,
    pub file_count: usize,
}

/// Output of a successful finalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedSession {
    /// Records joined with [`RECORD_SEPARATOR`], no trailing newline.
    pub text: String,
    pub record_count: usize,
    pub file_count: usize,
}

type SessionSlot = Arc<Mutex<SessionState>>;

/// Keyed store of session states.
///
/// The map lock is only held to look up or insert a slot. All mutation of a
/// session happens under that session's own mutex, so sessions never block
/// each other.
#[derive(Debug, Default)]
pub struct SessionAggregator {
    sessions: RwLock<HashMap<SessionId, SessionSlot>>,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the slot for `id`, creating an empty session on first use.
    async fn slot(&self, id: &SessionId) -> SessionSlot {
        if let Some(slot) = self.sessions.read().await.get(id) {
            return slot.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions.entry(id.clone()).or_default().clone()
    }

    async fn existing(&self, id: &SessionId) -> Option<SessionSlot> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Extract one file and append its records to the session.
    ///
    /// Returns the number of records this file contributed. On failure the
    /// session is left exactly as it was.
    pub async fn accept(
        &self,
        id: &SessionId,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<usize, ParseError> {
        let slot = self.slot(id).await;
        // Taken before extraction so files land in the order callers arrived.
        let mut state = slot.lock().await;
        Self::accept_locked(id, &mut state, bytes, filename).await
    }

    /// Accept several files in order, continuing past failures.
    ///
    /// The whole batch is appended under one lock, so no other caller's file
    /// can land between two files of the batch.
    pub async fn accept_batch(
        &self,
        id: &SessionId,
        uploads: Vec<SpreadsheetUpload>,
    ) -> Vec<FileOutcome> {
        let slot = self.slot(id).await;
        let mut state = slot.lock().await;

        let mut outcomes = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let result = Self::accept_locked(id, &mut state, upload.bytes, &upload.filename).await;
            outcomes.push(FileOutcome {
                filename: upload.filename,
                result,
            });
        }
        outcomes
    }

    async fn accept_locked(
        id: &SessionId,
        state: &mut SessionState,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<usize, ParseError> {
        let size = bytes.len();
        let extracted = tokio::task::spawn_blocking(move || extract(&bytes))
            .await
            .map_err(|e| ParseError::Aborted(e.to_string()))
            .and_then(|result| result);

        match extracted {
            Ok(records) => {
                let count = records.len();
                state.append(records);
                tracing::info!(
                    session = %id,
                    file = %filename,
                    size_bytes = size,
                    records = count,
                    total_records = state.record_count(),
                    files = state.file_count(),
                    "Spreadsheet accepted"
                );
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(
                    session = %id,
                    file = %filename,
                    size_bytes = size,
                    error = %e,
                    "Spreadsheet rejected"
                );
                Err(e)
            }
        }
    }

    /// Merge the session's records into one text blob and empty the session.
    pub async fn finalize(&self, id: &SessionId) -> Result<FinalizedSession, EmptySessionError> {
        let slot = self.finalizable(id).await?;
        let mut state = slot.lock().await;
        let finalized = Self::merge(id, &state)?;
        state.clear();
        Self::log_finalized(id, &finalized);
        Ok(finalized)
    }

    /// Finalize, but only empty the session once `deliver` succeeds.
    ///
    /// The session stays locked while `deliver` runs, so nothing is appended
    /// or reset between merging and clearing. When `deliver` fails the
    /// session is left exactly as it was and its error is returned inside
    /// the outer `Ok`.
    pub async fn finalize_with<F, Fut, T, E>(
        &self,
        id: &SessionId,
        deliver: F,
    ) -> Result<Result<T, E>, EmptySessionError>
    where
        F: FnOnce(FinalizedSession) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = self.finalizable(id).await?;
        let mut state = slot.lock().await;
        let finalized = Self::merge(id, &state)?;
        let (records, files) = (finalized.record_count, finalized.file_count);

        let delivered = deliver(finalized).await;
        if delivered.is_ok() {
            state.clear();
            tracing::info!(session = %id, records, files, "Session finalized");
        } else {
            tracing::warn!(session = %id, records, files, "Delivery failed, session kept");
        }
        Ok(delivered)
    }

    async fn finalizable(&self, id: &SessionId) -> Result<SessionSlot, EmptySessionError> {
        self.existing(id).await.ok_or_else(|| EmptySessionError {
            session: id.clone(),
            file_count: 0,
        })
    }

    fn merge(id: &SessionId, state: &SessionState) -> Result<FinalizedSession, EmptySessionError> {
        if state.records.is_empty() {
            return Err(EmptySessionError {
                session: id.clone(),
                file_count: state.file_count,
            });
        }

        Ok(FinalizedSession {
            text: state.records.join(RECORD_SEPARATOR),
            record_count: state.records.len(),
            file_count: state.file_count,
        })
    }

    fn log_finalized(id: &SessionId, finalized: &FinalizedSession) {
        tracing::info!(
            session = %id,
            records = finalized.record_count,
            files = finalized.file_count,
            "Session finalized"
        );
    }

    /// Discard everything accumulated for the session. Clearing an empty or
    /// unknown session is a no-op.
    pub async fn reset(&self, id: &SessionId) {
        if let Some(slot) = self.existing(id).await {
            let mut state = slot.lock().await;
            if !state.is_empty() {
                tracing::info!(
                    session = %id,
                    discarded_records = state.record_count(),
                    discarded_files = state.file_count(),
                    "Session reset"
                );
            }
            state.clear();
        }
    }

    /// Current counters of the session (zero for unknown sessions).
    pub async fn stats(&self, id: &SessionId) -> SessionStats {
        match self.existing(id).await {
            Some(slot) => slot.lock().await.stats(),
            None => SessionStats::default(),
        }
    }

    /// Number of sessions that have ever been used.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
