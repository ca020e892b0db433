//! Restoring undo history from server records
//!
//! A freshly opened editor has an empty history. Restoring walks the
//! server's records backwards from the history tail and unshifts them: the
//! target user's own edits become undo frames, everyone else's are folded
//! into the tail so replay order stays intact.

use super::editor_history::EditorHistory;
use super::entry::RestoredEntry;
use crate::changeset::{Changeset, Record, Revision};
use crate::error::{Result, SyncError};

/// Read access to a document's committed records
pub trait RevisionRecordSource {
    /// The newest `limit` records with a revision below `revision`, in
    /// ascending order. Fewer (or none) when history runs out.
    fn records_before(&self, revision: Revision, limit: usize) -> Result<Vec<Record>>;

    /// Plain text at `revision`
    fn text_at(&self, revision: Revision) -> Result<Changeset>;
}

/// Restores a user's undo frames from a [`RevisionRecordSource`].
///
/// # Example
///
/// ```rust
/// use synckit_collab::changeset::{Changeset, ChangeSubmission, RevisionChangeset, SelectionRange};
/// use synckit_collab::history::{EditorHistory, EditorRecordsHistoryRestore};
/// use synckit_collab::server::DocumentServer;
///
/// let mut server = DocumentServer::new(Changeset::from_text(""));
/// server
///     .add_change(ChangeSubmission::authored(
///         RevisionChangeset::new(0, Changeset::from_text("hi")),
///         "alice",
///         SelectionRange::caret(0),
///         SelectionRange::caret(2),
///     ))
///     .unwrap();
///
/// let mut history = EditorHistory::new(server.head_text().clone(), server.head_revision(), 100);
/// let restore = EditorRecordsHistoryRestore::new(&server, 50);
/// assert_eq!(restore.restore(&mut history, 10, "alice").unwrap(), 1);
/// assert!(history.can_undo());
/// ```
pub struct EditorRecordsHistoryRestore<'a, S: RevisionRecordSource + ?Sized> {
    source: &'a S,
    batch_size: usize,
}

impl<'a, S: RevisionRecordSource + ?Sized> EditorRecordsHistoryRestore<'a, S> {
    /// `batch_size` records are fetched per round trip (at least one)
    pub fn new(source: &'a S, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
        }
    }

    /// Unshift records until `desired_count` of `user`'s edits are undoable
    /// or the records run out. Returns the number of frames restored.
    pub fn restore(
        &self,
        history: &mut EditorHistory,
        desired_count: usize,
        user: &str,
    ) -> Result<usize> {
        let mut restored = 0;

        while restored < desired_count && history.tail_revision() > 0 {
            let tail_revision = history.tail_revision();
            let batch = self
                .source
                .records_before(tail_revision + 1, self.batch_size)?;
            let Some(newest) = batch.last() else {
                break;
            };
            if newest.revision != tail_revision {
                return Err(SyncError::Protocol(format!(
                    "record source ends at revision {} but history tail is at {tail_revision}",
                    newest.revision
                )));
            }

            // oldest record needed to reach the quota
            let mut start = batch.len();
            let mut counted = 0;
            while start > 0 && restored + counted < desired_count {
                start -= 1;
                if batch[start].is_undoable_by(user) {
                    counted += 1;
                }
            }
            let records = &batch[start..];
            let oldest = records[0].revision;
            let Some(new_tail_revision) = oldest.checked_sub(1) else {
                return Err(SyncError::Protocol("record with revision 0".to_string()));
            };

            let new_tail = self.source.text_at(new_tail_revision)?;
            let entries = records
                .iter()
                .map(|record| restored_entry(record, user))
                .collect();
            let added = history.unshift(new_tail, new_tail_revision, entries)?;
            restored += added;

            tracing::debug!(
                from = oldest,
                to = tail_revision,
                added,
                restored,
                "restored history batch"
            );

            // a short batch means the source has nothing older
            if batch.len() < self.batch_size && start == 0 {
                break;
            }
        }

        Ok(restored)
    }
}

fn restored_entry(record: &Record, user: &str) -> RestoredEntry {
    match record.after_selection {
        Some(after) if record.is_undoable_by(user) => RestoredEntry::undoable(
            record.changeset.clone(),
            record.before_selection.unwrap_or(after),
            after,
        ),
        _ => RestoredEntry::tail_only(record.changeset.clone()),
    }
}
