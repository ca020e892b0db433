//! Error types for the sync engine
//!
//! Errors fall into two classes:
//! - **Protocol violations** (a change references a revision the receiver
//!   cannot handle). These need a full resync, see [`SyncError::requires_resync`].
//! - **Structural violations** (a malformed changeset or an out-of-range
//!   retain). These are programming errors and are never coerced.
//!
//! Benign no-ops (submitting nothing, undoing past the start of history)
//! are not errors; the corresponding operations return `false` or `None`.

use crate::changeset::Revision;
use thiserror::Error;

/// Errors produced by the sync engine.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncError {
    /// A change was composed on a revision newer than the receiver's head.
    #[error("revision {revision} is ahead of head revision {head}")]
    FutureRevision { revision: Revision, head: Revision },

    /// Records required to fold a change forward have been pruned.
    #[error("records after revision {revision} are no longer retained (oldest retained: {oldest})")]
    HistoryPruned { revision: Revision, oldest: Revision },

    /// A retain references characters past the end of the text it applies to.
    #[error("changeset retains index {index} but the text has length {length}")]
    OutOfRange { index: usize, length: usize },

    /// A changeset violates its structural invariants.
    #[error("invalid changeset: {0}")]
    InvalidChangeset(String),

    /// The server and client disagree about the shared text.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A history range does not address valid entries.
    #[error("invalid history range {start}..{end} (entries: {len}, undo position: {index})")]
    InvalidHistoryRange {
        start: usize,
        end: usize,
        len: usize,
        index: usize,
    },

    /// A field name is not part of the document.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// The document does not exist in the store.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The document changed between read and commit.
    #[error("transaction conflict: expected version {expected}, found {actual}")]
    TransactionConflict { expected: u64, actual: u64 },

    /// A transaction kept conflicting.
    #[error("transaction failed after {0} attempts")]
    RetriesExhausted(u32),

    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the caller must refetch the head text and reset its state.
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            SyncError::FutureRevision { .. }
                | SyncError::HistoryPruned { .. }
                | SyncError::Protocol(_)
        )
    }
}

/// Result type for sync engine operations
pub type Result<T> = std::result::Result<T, SyncError>;
