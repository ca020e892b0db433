//! Versioned document storage for multi-field documents
//!
//! A stored document is a set of named text fields, each with its latest
//! text and its full record log. Every successful commit bumps the document
//! version; a commit based on a stale version is rejected, which is what
//! serializes concurrent transactions.

use crate::changeset::{Changeset, Record, Revision};
use crate::error::{Result, SyncError};
use crate::DocumentID;
use dashmap::DashMap;
use std::collections::HashMap;
use uuid::Uuid;

/// One stored text field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredField {
    /// Text at revision 0
    pub initial_text: Changeset,
    pub latest_text: Changeset,
    pub latest_revision: Revision,
    /// Record `r` at `records[r - 1]`
    pub records: Vec<Record>,
}

impl StoredField {
    pub fn new(text: Changeset) -> Self {
        Self {
            initial_text: text.clone(),
            latest_text: text,
            latest_revision: 0,
            records: Vec::new(),
        }
    }

    /// Length of the text at `revision`, if it exists
    pub fn length_at(&self, revision: Revision) -> Option<usize> {
        match revision {
            0 => Some(self.initial_text.len()),
            _ => self
                .records
                .get(revision as usize - 1)
                .map(|record| record.changeset.len()),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StoredDocument {
    fields: HashMap<String, StoredField>,
    version: u64,
}

/// What a transaction reads of one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSnapshot {
    pub latest_text: Changeset,
    pub latest_revision: Revision,

    /// Revision the records start after
    pub base_revision: Revision,

    /// Length of the text at `base_revision`
    pub base_len: usize,

    /// Records after `base_revision`
    pub records: Vec<Record>,
}

/// What a transaction reads of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub version: u64,
    pub fields: HashMap<String, FieldSnapshot>,
}

/// New state for one field at commit time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdate {
    pub field: String,
    pub latest_text: Changeset,
    pub latest_revision: Revision,

    /// Records to append, ascending
    pub records: Vec<Record>,
}

/// Transactional storage the multi-field server runs against.
///
/// Implementations must make `commit` atomic: either every update is
/// applied and the version bumped, or nothing changes.
pub trait DocumentStore: Send + Sync {
    /// Create a document with the given fields at revision 0
    fn create_document(&self, fields: Vec<(String, Changeset)>) -> Result<DocumentID>;

    /// Read `fields` with only the records after each field's given revision
    fn load(
        &self,
        id: &DocumentID,
        fields: &HashMap<String, Revision>,
    ) -> Result<DocumentSnapshot>;

    /// Apply `updates` if the document is still at `expected_version`.
    ///
    /// Returns the new version, or `SyncError::TransactionConflict`.
    fn commit(&self, id: &DocumentID, expected_version: u64, updates: Vec<FieldUpdate>) -> Result<u64>;
}

/// In-memory [`DocumentStore`].
///
/// # Example
///
/// ```rust
/// use synckit_collab::changeset::Changeset;
/// use synckit_collab::server::{DocumentStore, MemoryDocumentStore};
///
/// let store = MemoryDocumentStore::new();
/// let id = store
///     .create_document(vec![("title".to_string(), Changeset::from_text("Notes"))])
///     .unwrap();
///
/// let field = store.field(&id, "title").unwrap();
/// assert_eq!(field.latest_text.to_text().unwrap(), "Notes");
/// assert_eq!(field.latest_revision, 0);
/// ```
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<DocumentID, StoredDocument>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Current document version
    pub fn version(&self, id: &DocumentID) -> Result<u64> {
        self.documents
            .get(id)
            .map(|document| document.version)
            .ok_or_else(|| SyncError::DocumentNotFound(id.to_string()))
    }

    /// Copy of one stored field
    pub fn field(&self, id: &DocumentID, name: &str) -> Result<StoredField> {
        let document = self
            .documents
            .get(id)
            .ok_or_else(|| SyncError::DocumentNotFound(id.to_string()))?;
        document
            .fields
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownField(name.to_string()))
    }

    pub fn remove_document(&self, id: &DocumentID) -> bool {
        self.documents.remove(id).is_some()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn create_document(&self, fields: Vec<(String, Changeset)>) -> Result<DocumentID> {
        let mut stored = HashMap::with_capacity(fields.len());
        for (name, text) in fields {
            if !text.is_text() {
                return Err(SyncError::InvalidChangeset(format!(
                    "initial value of field {name} must be plain text"
                )));
            }
            stored.insert(name, StoredField::new(text));
        }

        let id = Uuid::new_v4();
        self.documents.insert(
            id,
            StoredDocument {
                fields: stored,
                version: 0,
            },
        );
        tracing::debug!(%id, "created document");
        Ok(id)
    }

    fn load(
        &self,
        id: &DocumentID,
        fields: &HashMap<String, Revision>,
    ) -> Result<DocumentSnapshot> {
        let document = self
            .documents
            .get(id)
            .ok_or_else(|| SyncError::DocumentNotFound(id.to_string()))?;

        let mut snapshot = HashMap::with_capacity(fields.len());
        for (name, &base_revision) in fields {
            let field = document
                .fields
                .get(name)
                .ok_or_else(|| SyncError::UnknownField(name.clone()))?;
            let base_len = field
                .length_at(base_revision)
                .ok_or(SyncError::FutureRevision {
                    revision: base_revision,
                    head: field.latest_revision,
                })?;
            snapshot.insert(
                name.clone(),
                FieldSnapshot {
                    latest_text: field.latest_text.clone(),
                    latest_revision: field.latest_revision,
                    base_revision,
                    base_len,
                    records: field.records[base_revision as usize..].to_vec(),
                },
            );
        }

        Ok(DocumentSnapshot {
            version: document.version,
            fields: snapshot,
        })
    }

    fn commit(&self, id: &DocumentID, expected_version: u64, updates: Vec<FieldUpdate>) -> Result<u64> {
        let mut document = self
            .documents
            .get_mut(id)
            .ok_or_else(|| SyncError::DocumentNotFound(id.to_string()))?;

        if document.version != expected_version {
            return Err(SyncError::TransactionConflict {
                expected: expected_version,
                actual: document.version,
            });
        }
        if let Some(update) = updates
            .iter()
            .find(|update| !document.fields.contains_key(&update.field))
        {
            return Err(SyncError::UnknownField(update.field.clone()));
        }

        for update in updates {
            if let Some(field) = document.fields.get_mut(&update.field) {
                field.latest_text = update.latest_text;
                field.latest_revision = update.latest_revision;
                field.records.extend(update.records);
            }
        }
        document.version += 1;
        Ok(document.version)
    }
}
