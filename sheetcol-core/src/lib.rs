//! sheetcol core - First-column extraction and session aggregation.
//!
//! ```text
//! bytes ──► extract ──► Vec<String> ──► SessionAggregator ──► finalize ──► text
//!                                         (per-session lock)
//! ```
//!
//! [`extract`] is pure and re-entrant. [`SessionAggregator`] owns the keyed
//! session store and serializes mutation per session.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod error;
pub mod extract;
pub mod session;

pub use error::{EmptySessionError, ParseError};
pub use extract::{extract, CellText};
pub use session::{
    FileOutcome, FinalizedSession, SessionAggregator, SessionId, SessionState, SessionStats,
    SpreadsheetUpload,
};
