//! Undo/redo history that survives concurrent edits
//!
//! - [`EditorHistory`] - the undo stack, rebased on every external change
//! - [`EditorRecordsHistoryRestore`] - refills the stack from server records

mod editor_history;
mod entry;
mod restore;

pub use editor_history::EditorHistory;
pub use entry::{HistoryEdit, HistoryEntry, HistoryOperation, RestoredEntry};
pub use restore::{EditorRecordsHistoryRestore, RevisionRecordSource};
