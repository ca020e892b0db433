//! Single-field revision store
//!
//! Holds the head text and an append-only list of records. A change made on
//! an older revision is folded forward with `follow` through every record
//! committed since, then appended as the next revision.

use crate::changeset::{ChangeSubmission, Changeset, Record, Revision};
use crate::error::{Result, SyncError};
use crate::history::RevisionRecordSource;

/// Append-only revision log for one text.
///
/// Revision 0 is the initial text; record `r` turns the text at `r - 1`
/// into the text at `r`.
///
/// # Example
///
/// ```rust
/// use synckit_collab::changeset::{Changeset, RevisionChangeset, Strip};
/// use synckit_collab::server::DocumentServer;
///
/// let mut server = DocumentServer::new(Changeset::from_text("hello"));
///
/// // two clients edit revision 0 concurrently
/// let a = Changeset::from_strips(vec![Strip::retain(0, 4), Strip::insert(" world")]).unwrap();
/// let b = Changeset::from_strips(vec![Strip::insert("oh, "), Strip::retain(0, 4)]).unwrap();
/// server.add_change(RevisionChangeset::new(0, a).into()).unwrap();
/// let record = server.add_change(RevisionChangeset::new(0, b).into()).unwrap();
///
/// assert_eq!(record.revision, 2);
/// assert_eq!(server.head_text().to_text().unwrap(), "oh, hello world");
/// ```
#[derive(Debug, Clone)]
pub struct DocumentServer {
    /// Text before the oldest retained record
    tail: Changeset,
    tail_revision: Revision,
    head: Changeset,
    records: Vec<Record>,
}

impl DocumentServer {
    /// New document at revision 0
    pub fn new(text: Changeset) -> Self {
        Self {
            tail: text.clone(),
            tail_revision: 0,
            head: text,
            records: Vec::new(),
        }
    }

    /// Rebuild a document from the text at `tail_revision` and the
    /// records committed after it, in order.
    ///
    /// # Errors
    ///
    /// `Protocol` if the records are not consecutive from `tail_revision + 1`
    /// or do not compose on the text.
    pub fn from_records(tail: Changeset, tail_revision: Revision, records: Vec<Record>) -> Result<Self> {
        let mut head = tail.clone();
        for (expected, record) in (tail_revision + 1..).zip(&records) {
            if record.revision != expected {
                return Err(SyncError::Protocol(format!(
                    "expected revision {expected}, got {}",
                    record.revision
                )));
            }
            head = head.compose(&record.changeset).map_err(|err| {
                SyncError::Protocol(format!("revision {} does not fit: {err}", record.revision))
            })?;
        }
        Ok(Self {
            tail,
            tail_revision,
            head,
            records,
        })
    }

    pub fn head_text(&self) -> &Changeset {
        &self.head
    }

    pub fn head_revision(&self) -> Revision {
        self.tail_revision + self.records.len() as Revision
    }

    /// Oldest revision changes can still be composed on
    pub fn oldest_revision(&self) -> Revision {
        self.tail_revision
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, revision: Revision) -> Option<&Record> {
        let offset = revision.checked_sub(self.tail_revision + 1)?;
        self.records.get(offset as usize)
    }

    /// Records committed after `revision`
    pub fn records_after(&self, revision: Revision) -> Result<&[Record]> {
        let head = self.head_revision();
        if revision > head {
            return Err(SyncError::FutureRevision { revision, head });
        }
        if revision < self.tail_revision {
            return Err(SyncError::HistoryPruned {
                revision,
                oldest: self.tail_revision,
            });
        }
        Ok(&self.records[(revision - self.tail_revision) as usize..])
    }

    /// Length of the text at `revision`
    pub fn length_at(&self, revision: Revision) -> Result<usize> {
        self.records_after(revision)?;
        Ok(match self.record(revision) {
            Some(record) => record.changeset.len(),
            None => self.tail.len(),
        })
    }

    /// Commit a change, folding it over everything newer than its revision.
    ///
    /// Returns the stored record, which is what gets broadcast to clients.
    ///
    /// # Errors
    ///
    /// - `FutureRevision` if the change is composed on a revision past head
    /// - `HistoryPruned` if the records to fold over were pruned
    /// - `OutOfRange` if the change does not fit the text at its revision
    pub fn add_change(&mut self, submission: ChangeSubmission) -> Result<Record> {
        let revision = submission.change.revision;
        let base_len = self.length_at(revision)?;
        let newer = self.records_after(revision)?;
        let record = fold_forward(submission, base_len, newer, self.head_revision() + 1)?;

        self.head = self.head.compose(&record.changeset)?;
        self.records.push(record.clone());
        tracing::debug!(
            base = revision,
            revision = record.revision,
            changeset = %record.changeset,
            "committed change"
        );
        Ok(record)
    }

    /// Plain text at `revision`
    pub fn text_at(&self, revision: Revision) -> Result<Changeset> {
        let newer = self.records_after(revision)?;
        let upto = self.records.len() - newer.len();
        let mut text = self.tail.clone();
        for record in &self.records[..upto] {
            text = text.compose(&record.changeset)?;
        }
        Ok(text)
    }

    /// Forget records up to and including `revision` (clamped to head).
    ///
    /// Changes composed on `revision` or later are still accepted. Returns
    /// the number of records dropped.
    pub fn prune_before(&mut self, revision: Revision) -> Result<usize> {
        let revision = revision.min(self.head_revision());
        if revision <= self.tail_revision {
            return Ok(0);
        }
        self.tail = self.text_at(revision)?;
        let count = (revision - self.tail_revision) as usize;
        self.records.drain(..count);
        self.tail_revision = revision;
        tracing::debug!(count, oldest = revision, "pruned records");
        Ok(count)
    }
}

impl RevisionRecordSource for DocumentServer {
    fn records_before(&self, revision: Revision, limit: usize) -> Result<Vec<Record>> {
        let last = revision.saturating_sub(1).min(self.head_revision());
        if last <= self.tail_revision {
            return Ok(Vec::new());
        }
        let end = (last - self.tail_revision) as usize;
        let start = end.saturating_sub(limit);
        Ok(self.records[start..end].to_vec())
    }

    fn text_at(&self, revision: Revision) -> Result<Changeset> {
        DocumentServer::text_at(self, revision)
    }
}

/// Fold `submission` over `newer` (the records after its revision) into
/// the record for `revision`.
///
/// Before/after selections are moved along so the record stays undoable.
pub(crate) fn fold_forward(
    submission: ChangeSubmission,
    base_len: usize,
    newer: &[Record],
    revision: Revision,
) -> Result<Record> {
    let ChangeSubmission {
        change,
        creator,
        mut before_selection,
        mut after_selection,
    } = submission;

    let mut changeset = change.changeset;
    if changeset.base_len() > base_len {
        return Err(SyncError::OutOfRange {
            index: changeset.base_len() - 1,
            length: base_len,
        });
    }

    for record in newer {
        let committed = &record.changeset;
        before_selection = before_selection.map(|selection| selection.follow(committed));
        after_selection = after_selection.map(|selection| selection.follow(&changeset.follow(committed)));
        changeset = committed.follow(&changeset);
    }
    if !newer.is_empty() {
        tracing::trace!(base = change.revision, over = newer.len(), %changeset, "folded change forward");
    }

    Ok(Record {
        revision,
        changeset,
        creator,
        before_selection,
        after_selection,
    })
}
