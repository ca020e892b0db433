//! SyncKit Collab - operational-transformation text sync engine
//!
//! This crate keeps several editors of one text converging through a
//! server that totally orders changes. It implements:
//! - A changeset algebra (compose, follow, inverse, swap)
//! - A client state machine with server/submitted/local/view lenses
//! - An ordered message buffer for out-of-order delivery
//! - An undo/redo history that survives concurrent edits
//! - Server-side revision stores with fold-forward of stale changes
//!
//! # Examples
//!
//! ```rust
//! use synckit_collab::changeset::{Changeset, RevisionChangeset};
//! use synckit_collab::client::CollabEditor;
//! use synckit_collab::config::EngineConfig;
//!
//! let head = RevisionChangeset::new(0, Changeset::from_text("hello"));
//! let mut editor = CollabEditor::new(head, &EngineConfig::default()).unwrap();
//!
//! editor.set_selection_range(5, 5);
//! editor.insert_text(" world").unwrap();
//! assert_eq!(editor.view_text(), "hello world");
//!
//! let payload = editor.submit_changes().unwrap();
//! assert_eq!(payload.changeset.to_json().unwrap(), r#"[[0,4]," world"]"#);
//! ```

pub mod changeset;
pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod protocol;
pub mod server;
pub mod sync;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports for convenience
pub use changeset::{Changeset, Record, Revision, RevisionChangeset, SelectionRange, Strip};
pub use client::{CollabEditor, DocumentState};
pub use config::EngineConfig;
pub use error::{Result, SyncError};

/// Client identifier type
pub type ClientID = String;

/// Document identifier type
pub type DocumentID = uuid::Uuid;

/// Field name within a multi-field document
pub type FieldPath = String;
