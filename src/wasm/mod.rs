//! WASM bindings for SyncKit Collab
//!
//! This module provides JavaScript-friendly bindings for the collaborative
//! editor. Records and changesets cross the boundary as JSON strings.

#[cfg(feature = "wasm")]
pub mod bindings;

#[cfg(feature = "wasm")]
pub mod utils;

// Re-export main types
#[cfg(feature = "wasm")]
pub use bindings::WasmCollabEditor;
