//! Client side of the sync engine
//!
//! [`DocumentState`] is the bare four-lens state machine; [`CollabEditor`]
//! wraps it with caret handling, undo history and message sequencing.

mod editor;
mod state;

pub use editor::{CollabEditor, ServerMessage};
pub use state::{ChangeSource, DocumentState, ViewChanged};
