//! Transactional fold-forward across the fields of one document
//!
//! Changes to several fields are queued and applied together: one snapshot
//! read, one fold-forward per field, one conditional commit. A commit that
//! loses the race is retried on a fresh snapshot.

use super::document::fold_forward;
use super::store::{DocumentStore, FieldSnapshot, FieldUpdate};
use crate::changeset::{ChangeSubmission, Changeset, Record, Revision};
use crate::config::ServerConfig;
use crate::error::{Result, SyncError};
use crate::DocumentID;
use std::collections::HashMap;
use std::sync::Arc;

/// Records committed by one [`MultiFieldDocumentServer::apply`], per field
pub type AppliedChanges = HashMap<String, Vec<Record>>;

/// Queues changes for several fields and commits them atomically.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use synckit_collab::changeset::{Changeset, RevisionChangeset, Strip};
/// use synckit_collab::config::ServerConfig;
/// use synckit_collab::server::{DocumentStore, MemoryDocumentStore, MultiFieldDocumentServer};
///
/// let store = Arc::new(MemoryDocumentStore::new());
/// let id = store
///     .create_document(vec![
///         ("title".to_string(), Changeset::from_text("Todo")),
///         ("body".to_string(), Changeset::empty()),
///     ])
///     .unwrap();
///
/// let mut server = MultiFieldDocumentServer::new(store.clone(), id, &ServerConfig::default());
/// let title = Changeset::from_strips(vec![Strip::retain(0, 3), Strip::insert("s")]).unwrap();
/// server.queue_change("title", RevisionChangeset::new(0, title));
/// server.queue_change("body", RevisionChangeset::new(0, Changeset::from_text("milk")));
///
/// let applied = server.apply().unwrap();
/// assert_eq!(applied["title"][0].revision, 1);
/// assert_eq!(store.field(&id, "title").unwrap().latest_text.to_text().unwrap(), "Todos");
/// ```
pub struct MultiFieldDocumentServer<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    document_id: DocumentID,
    queue: Vec<(String, ChangeSubmission)>,
    max_retries: u32,
}

impl<S: DocumentStore + ?Sized> MultiFieldDocumentServer<S> {
    pub fn new(store: Arc<S>, document_id: DocumentID, config: &ServerConfig) -> Self {
        Self {
            store,
            document_id,
            queue: Vec::new(),
            max_retries: config.max_transaction_retries.max(1),
        }
    }

    pub fn document_id(&self) -> &DocumentID {
        &self.document_id
    }

    /// Number of queued changes
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queue a change for `field`, applied in queue order
    pub fn queue_change(&mut self, field: impl Into<String>, submission: impl Into<ChangeSubmission>) {
        self.queue.push((field.into(), submission.into()));
    }

    /// Drop queued changes without applying them
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Apply every queued change in one transaction.
    ///
    /// On success the queue is emptied. On failure it is kept, so the
    /// caller may inspect or retry it.
    ///
    /// # Errors
    ///
    /// `RetriesExhausted` when every attempt lost a conflict; otherwise the
    /// first fold or store error.
    pub fn apply(&mut self) -> Result<AppliedChanges> {
        if self.queue.is_empty() {
            return Ok(AppliedChanges::new());
        }

        for attempt in 1..=self.max_retries {
            match self.try_apply() {
                Ok(applied) => {
                    self.queue.clear();
                    return Ok(applied);
                }
                Err(SyncError::TransactionConflict { expected, actual }) => {
                    tracing::warn!(
                        document = %self.document_id,
                        attempt,
                        expected,
                        actual,
                        "transaction conflict, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Err(SyncError::RetriesExhausted(self.max_retries))
    }

    fn try_apply(&self) -> Result<AppliedChanges> {
        let mut base_revisions: HashMap<String, Revision> = HashMap::new();
        for (field, submission) in &self.queue {
            let revision = submission.change.revision;
            base_revisions
                .entry(field.clone())
                .and_modify(|base| *base = (*base).min(revision))
                .or_insert(revision);
        }

        let snapshot = self.store.load(&self.document_id, &base_revisions)?;
        let mut folds: HashMap<String, FieldFold> = snapshot
            .fields
            .into_iter()
            .map(|(name, field)| (name, FieldFold::new(field)))
            .collect();

        for (field, submission) in &self.queue {
            let fold = folds
                .get_mut(field)
                .ok_or_else(|| SyncError::UnknownField(field.clone()))?;
            fold.add_change(submission.clone())?;
        }

        let mut applied = AppliedChanges::new();
        let mut updates = Vec::with_capacity(folds.len());
        for (name, fold) in folds {
            if fold.added.is_empty() {
                continue;
            }
            updates.push(FieldUpdate {
                field: name.clone(),
                latest_text: fold.text,
                latest_revision: fold.revision,
                records: fold.added.clone(),
            });
            applied.insert(name, fold.added);
        }

        let version = self.store.commit(&self.document_id, snapshot.version, updates)?;
        tracing::debug!(
            document = %self.document_id,
            version,
            fields = applied.len(),
            changes = self.queue.len(),
            "applied transaction"
        );
        Ok(applied)
    }
}

/// Fold state of one field within a transaction
struct FieldFold {
    text: Changeset,
    revision: Revision,
    base_revision: Revision,
    base_len: usize,
    /// Records after `base_revision`: loaded, then added
    records: Vec<Record>,
    added: Vec<Record>,
}

impl FieldFold {
    fn new(snapshot: FieldSnapshot) -> Self {
        Self {
            text: snapshot.latest_text,
            revision: snapshot.latest_revision,
            base_revision: snapshot.base_revision,
            base_len: snapshot.base_len,
            records: snapshot.records,
            added: Vec::new(),
        }
    }

    fn add_change(&mut self, submission: ChangeSubmission) -> Result<()> {
        let revision = submission.change.revision;
        if revision > self.revision {
            return Err(SyncError::FutureRevision {
                revision,
                head: self.revision,
            });
        }

        let offset = (revision - self.base_revision) as usize;
        let base_len = match offset {
            0 => self.base_len,
            _ => self.records[offset - 1].changeset.len(),
        };
        let record = fold_forward(submission, base_len, &self.records[offset..], self.revision + 1)?;

        self.text = self.text.compose(&record.changeset)?;
        self.revision = record.revision;
        self.records.push(record.clone());
        self.added.push(record);
        Ok(())
    }
}
