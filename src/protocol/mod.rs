//! Wire protocol
//!
//! The transport itself lives outside this crate; this module only defines
//! how changesets and records are encoded for it.

pub mod serialize;

pub use serialize::{from_json, to_json};
