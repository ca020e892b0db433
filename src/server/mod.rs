//! Server-side revision stores
//!
//! - [`DocumentServer`] - in-memory log for a single text
//! - [`MultiFieldDocumentServer`] - transactional changes across the
//!   fields of a document kept in a [`DocumentStore`]

mod document;
mod multi_field;
mod store;

pub use document::DocumentServer;
pub use multi_field::{AppliedChanges, MultiFieldDocumentServer};
pub use store::{
    DocumentSnapshot, DocumentStore, FieldSnapshot, FieldUpdate, MemoryDocumentStore, StoredField,
};
