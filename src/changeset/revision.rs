//! Revision-tagged changesets and persisted records

use super::set::Changeset;
use crate::ClientID;
use serde::{Deserialize, Serialize};

/// Server-assigned, strictly increasing change number
pub type Revision = u64;

/// Caret range in a text, `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: usize,
    pub end: usize,
}

impl SelectionRange {
    /// Range between two carets, in either order
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    /// Collapsed range at `caret`
    pub fn caret(caret: usize) -> Self {
        Self {
            start: caret,
            end: caret,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Clamp both ends to `[0, len]`
    pub fn clamp(&self, len: usize) -> Self {
        Self::new(self.start.min(len), self.end.min(len))
    }

    /// Map both ends through a change applied to the text
    pub fn follow(&self, change: &Changeset) -> Self {
        Self::new(change.follow_index(self.start), change.follow_index(self.end))
    }
}

/// A changeset together with the revision it is composable on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionChangeset {
    pub revision: Revision,
    pub changeset: Changeset,
}

impl RevisionChangeset {
    pub fn new(revision: Revision, changeset: Changeset) -> Self {
        Self {
            revision,
            changeset,
        }
    }
}

/// A committed change as the server stores and broadcasts it.
///
/// `revision` is the revision this record creates; its changeset is
/// composable on the text at `revision - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub revision: Revision,
    pub changeset: Changeset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<ClientID>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_selection: Option<SelectionRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_selection: Option<SelectionRange>,
}

impl Record {
    pub fn new(revision: Revision, changeset: Changeset) -> Self {
        Self {
            revision,
            changeset,
            creator: None,
            before_selection: None,
            after_selection: None,
        }
    }

    /// Whether `user` made this change with a caret, i.e. it can be undone
    pub fn is_undoable_by(&self, user: &str) -> bool {
        self.creator.as_deref() == Some(user) && self.after_selection.is_some()
    }
}

impl From<&Record> for RevisionChangeset {
    fn from(record: &Record) -> Self {
        RevisionChangeset::new(record.revision, record.changeset.clone())
    }
}

/// A change sent to the server, with optional attribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSubmission {
    pub change: RevisionChangeset,
    #[serde(default)]
    pub creator: Option<ClientID>,
    #[serde(default)]
    pub before_selection: Option<SelectionRange>,
    #[serde(default)]
    pub after_selection: Option<SelectionRange>,
}

impl ChangeSubmission {
    pub fn authored(
        change: RevisionChangeset,
        creator: impl Into<ClientID>,
        before_selection: SelectionRange,
        after_selection: SelectionRange,
    ) -> Self {
        Self {
            change,
            creator: Some(creator.into()),
            before_selection: Some(before_selection),
            after_selection: Some(after_selection),
        }
    }
}

impl From<RevisionChangeset> for ChangeSubmission {
    fn from(change: RevisionChangeset) -> Self {
        Self {
            change,
            creator: None,
            before_selection: None,
            after_selection: None,
        }
    }
}
