//! Error kinds raised by extraction and aggregation.

use crate::session::SessionId;

/// Spreadsheet bytes could not be decoded into a grid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("not a readable spreadsheet: {0}")]
    Unreadable(String),

    #[error("workbook contains no worksheets")]
    NoWorksheets,

    #[error("extraction aborted: {0}")]
    Aborted(String),
}

/// `finalize` was called on a session with nothing to merge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("session {session} has no extracted records ({file_count} files accepted)")]
pub struct EmptySessionError {
    pub session: SessionId,
    /// Files accepted so far; non-zero means the files held no data.
    pub file_count: usize,
}
