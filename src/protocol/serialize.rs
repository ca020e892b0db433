// Serialization layer - Convert changesets to/from the wire array format
//!
//! A changeset travels as a JSON array whose elements are:
//! - a string: insert that text
//! - an integer `i`: retain the single character `i`
//! - a pair `[start, end]`: retain the inclusive range
//! - `null`: the empty strip, skipped when decoding
//!
//! The empty changeset is written as `[null]`; `[]` is accepted too.
//!
//! ```text
//! [[0,10]," fill",[11,21]]
//! ```

use crate::changeset::{Changeset, Strip};
use crate::error::{Result, SyncError};
use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One wire element
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WireStrip {
    Insert(String),
    Single(usize),
    Range([usize; 2]),
    Empty(()),
}

impl From<&Strip> for WireStrip {
    fn from(strip: &Strip) -> Self {
        match strip {
            Strip::Insert(text) => WireStrip::Insert(text.clone()),
            Strip::Retain { start, end } if start == end => WireStrip::Single(*start),
            Strip::Retain { start, end } => WireStrip::Range([*start, *end]),
        }
    }
}

impl Serialize for Changeset {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.strips().is_empty() {
            let mut seq = serializer.serialize_seq(Some(1))?;
            seq.serialize_element(&WireStrip::Empty(()))?;
            return seq.end();
        }
        let mut seq = serializer.serialize_seq(Some(self.strips().len()))?;
        for strip in self.strips() {
            seq.serialize_element(&WireStrip::from(strip))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Changeset {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = Vec::<WireStrip>::deserialize(deserializer)?;
        let mut strips = Vec::with_capacity(wire.len());
        for element in wire {
            match element {
                WireStrip::Insert(text) => strips.push(Strip::Insert(text)),
                WireStrip::Single(index) => strips.push(Strip::retain(index, index)),
                WireStrip::Range([start, end]) => {
                    if end < start {
                        return Err(D::Error::custom(format!(
                            "retain [{start}, {end}] is reversed"
                        )));
                    }
                    strips.push(Strip::retain(start, end));
                }
                WireStrip::Empty(()) => {}
            }
        }
        Changeset::from_strips(strips).map_err(D::Error::custom)
    }
}

impl Changeset {
    /// Encode as a wire array string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a wire array string
    ///
    /// # Example
    ///
    /// ```rust
    /// use synckit_collab::changeset::Changeset;
    ///
    /// let changeset = Changeset::from_json(r#"[[0,10]," fill",[11,21]]"#).unwrap();
    /// assert_eq!(changeset.len(), 27);
    /// assert_eq!(changeset.to_json().unwrap(), r#"[[0,10]," fill",[11,21]]"#);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            if e.is_data() {
                SyncError::InvalidChangeset(e.to_string())
            } else {
                SyncError::Serialization(e)
            }
        })
    }
}

/// Encode any serializable protocol value (records, submissions) as JSON
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a protocol value from JSON
pub fn from_json<T: for<'de> Deserialize<'de>>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}
