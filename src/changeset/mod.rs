//! Changeset algebra
//!
//! Immutable edit descriptions and the pure operations on them:
//!
//! - **compose**: apply one change after another
//! - **follow**: rebase a change over a concurrent one (OT transform)
//! - **inverse**: undo a change against a reference text
//! - **swap_changes**: reorder two sequential changes
//! - **insertions_to_retained**: collapse retyped text
//!
//! Everything here is stateless and safe to call from any thread.
//!
//! # Example
//!
//! ```rust
//! use synckit_collab::changeset::{insertion_operation, Changeset, SelectionRange};
//!
//! let text = Changeset::from_text("hello");
//! let op = insertion_operation(" world", SelectionRange::caret(5), &text).unwrap();
//! let result = text.compose(&op.changeset).unwrap();
//! assert_eq!(result.to_text().unwrap(), "hello world");
//! ```

mod edit;
mod revision;
mod set;
mod strip;
mod transform;

pub use edit::{deletion_count_operation, insertion_operation, EditOperation};
pub use revision::{ChangeSubmission, Record, Revision, RevisionChangeset, SelectionRange};
pub use set::{Changeset, ChangesetBuilder};
pub use strip::Strip;
