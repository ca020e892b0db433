//! History entry types

use crate::changeset::{Changeset, SelectionRange};

/// A changeset and the selection to show after applying it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryOperation {
    pub changeset: Changeset,
    pub selection: SelectionRange,
}

impl HistoryOperation {
    pub fn new(changeset: Changeset, selection: SelectionRange) -> Self {
        Self {
            changeset,
            selection,
        }
    }
}

/// One undo frame.
///
/// `execute` is composable on the text before the entry, `undo` on the text
/// after it; `undo.selection` is the selection before the edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub execute: HistoryOperation,
    pub undo: HistoryOperation,
}

/// A local edit to push onto the history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEdit {
    pub changeset: Changeset,

    /// Precomputed undo changeset; derived from the head text when `None`
    pub undo: Option<Changeset>,

    pub before_selection: SelectionRange,
    pub after_selection: SelectionRange,
}

impl HistoryEdit {
    pub fn new(
        changeset: Changeset,
        before_selection: SelectionRange,
        after_selection: SelectionRange,
    ) -> Self {
        Self {
            changeset,
            undo: None,
            before_selection,
            after_selection,
        }
    }

    pub fn with_undo(mut self, undo: Changeset) -> Self {
        self.undo = Some(undo);
        self
    }
}

/// A change restored from server records, oldest first.
///
/// Entries with selections become undo frames, the others are folded into
/// the tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredEntry {
    pub changeset: Changeset,

    /// Selections before and after the change
    pub selections: Option<(SelectionRange, SelectionRange)>,
}

impl RestoredEntry {
    pub fn tail_only(changeset: Changeset) -> Self {
        Self {
            changeset,
            selections: None,
        }
    }

    pub fn undoable(changeset: Changeset, before: SelectionRange, after: SelectionRange) -> Self {
        Self {
            changeset,
            selections: Some((before, after)),
        }
    }

    pub fn is_undoable(&self) -> bool {
        self.selections.is_some()
    }
}
