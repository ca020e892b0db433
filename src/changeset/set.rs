//! Changeset: an immutable, compacted sequence of strips
//!
//! A changeset describes how to build a new text out of an old one. Retain
//! strips copy characters from the old text (in order, each at most once),
//! insert strips add literal text. A changeset whose strips are all inserts
//! is a plain text: it is composable on the empty text.
//!
//! ```text
//! base:      "preexisting text value"
//! changeset: [[0,10], " fill", [11,21]]
//! result:    "preexisting fill text value"
//! ```

use super::strip::Strip;
use crate::error::{Result, SyncError};

/// Immutable edit description; see the module docs.
///
/// All operations return new changesets.
///
/// # Example
///
/// ```rust
/// use synckit_collab::changeset::{Changeset, Strip};
///
/// let base = Changeset::from_text("hello");
/// let change = Changeset::from_strips(vec![
///     Strip::retain(0, 4),
///     Strip::insert(" world"),
/// ]).unwrap();
///
/// let result = base.compose(&change).unwrap();
/// assert_eq!(result.to_text().unwrap(), "hello world");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Changeset {
    strips: Vec<Strip>,
    len: usize,
}

impl Changeset {
    /// Canonical empty changeset (the empty text)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Changeset retaining every character of a text of length `len`
    pub fn identity(len: usize) -> Self {
        if len == 0 {
            return Self::empty();
        }
        Self {
            strips: vec![Strip::retain(0, len - 1)],
            len,
        }
    }

    /// Plain text changeset
    pub fn from_text(text: &str) -> Self {
        let mut builder = ChangesetBuilder::new();
        builder.insert(text);
        builder.build()
    }

    /// Build a changeset from strips, compacting and validating them.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidChangeset` if retains are not strictly
    /// increasing (a character retained twice or out of order).
    pub fn from_strips(strips: impl IntoIterator<Item = Strip>) -> Result<Self> {
        let mut builder = ChangesetBuilder::new();
        let mut last_end: Option<usize> = None;
        for strip in strips {
            if let Strip::Retain { start, end } = strip {
                if end < start {
                    return Err(SyncError::InvalidChangeset(format!(
                        "retain [{start}, {end}] is reversed"
                    )));
                }
                if let Some(last) = last_end {
                    if start <= last {
                        return Err(SyncError::InvalidChangeset(format!(
                            "retain [{start}, {end}] overlaps or precedes index {last}"
                        )));
                    }
                }
                last_end = Some(end);
            }
            builder.push(strip);
        }
        Ok(builder.build())
    }

    pub fn strips(&self) -> &[Strip] {
        &self.strips
    }

    /// Length of the resulting text
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Largest retained index, if anything is retained
    pub fn max_index(&self) -> Option<usize> {
        self.strips.iter().rev().find_map(|strip| match strip {
            Strip::Retain { end, .. } => Some(*end),
            Strip::Insert(_) => None,
        })
    }

    /// Minimum length of a text this changeset is composable on
    pub fn base_len(&self) -> usize {
        self.max_index().map_or(0, |index| index + 1)
    }

    /// Whether this changeset leaves a text of length `base_len` unchanged
    pub fn is_identity_for(&self, base_len: usize) -> bool {
        match self.strips.as_slice() {
            [] => base_len == 0,
            [Strip::Retain { start: 0, end }] => end + 1 == base_len,
            _ => false,
        }
    }

    /// Identity changeset on this changeset's result
    pub fn to_identity(&self) -> Changeset {
        Self::identity(self.len)
    }

    /// Whether every strip is an insert
    pub fn is_text(&self) -> bool {
        self.strips.iter().all(Strip::is_insert)
    }

    /// The text this changeset represents, if it is plain text
    pub fn to_text(&self) -> Option<String> {
        let mut text = String::new();
        for strip in &self.strips {
            match strip {
                Strip::Insert(value) => text.push_str(value),
                Strip::Retain { .. } => return None,
            }
        }
        Some(text)
    }

    /// Apply this changeset to a string
    pub fn apply(&self, text: &str) -> Result<String> {
        let composed = Changeset::from_text(text).compose(self)?;
        Ok(composed.to_text().unwrap_or_default())
    }

    /// Compose `self` then `other`.
    ///
    /// Every retain in `other` is resolved against the strips of `self`;
    /// inserts in `other` pass through unchanged. The result is composable
    /// on whatever `self` is composable on.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::OutOfRange` if `other` retains past the end of
    /// `self`'s result (the two changesets belong to different revisions).
    pub fn compose(&self, other: &Changeset) -> Result<Changeset> {
        let lens: Vec<usize> = self.strips.iter().map(Strip::len).collect();
        let mut builder = ChangesetBuilder::new();
        let mut idx = 0;
        let mut offset = 0;

        for strip in &other.strips {
            match strip {
                Strip::Insert(_) => builder.push(strip.clone()),
                Strip::Retain { start, end } => {
                    if *end >= self.len {
                        return Err(SyncError::OutOfRange {
                            index: *end,
                            length: self.len,
                        });
                    }
                    let to = end + 1;
                    let mut from = *start;
                    while from < to {
                        while offset + lens[idx] <= from {
                            offset += lens[idx];
                            idx += 1;
                        }
                        let local_to = (to - offset).min(lens[idx]);
                        if let Some(piece) = self.strips[idx].slice(from - offset, local_to) {
                            builder.push(piece);
                        }
                        from = offset + local_to;
                    }
                }
            }
        }

        tracing::trace!(left = %self, right = %other, "composed changesets");
        Ok(builder.build())
    }

    /// Strips covering result offsets `from..to`
    pub fn slice(&self, from: usize, to: usize) -> Result<Changeset> {
        if to > self.len {
            return Err(SyncError::OutOfRange {
                index: to.saturating_sub(1),
                length: self.len,
            });
        }
        let mut builder = ChangesetBuilder::new();
        let mut offset = 0;
        for strip in &self.strips {
            let len = strip.len();
            if offset >= to {
                break;
            }
            if offset + len > from {
                let local_from = from.saturating_sub(offset);
                let local_to = (to - offset).min(len);
                if let Some(piece) = strip.slice(local_from, local_to) {
                    builder.push(piece);
                }
            }
            offset += len;
        }
        Ok(builder.build())
    }

    /// Changeset undoing `self`, given a `reference` whose result is the
    /// text `self` was applied to.
    ///
    /// Retained characters are retained back, inserted characters are
    /// dropped, deleted characters are taken from `reference`. With a plain
    /// text reference they are re-inserted, so the inverse is composable on
    /// `reference ∘ self` and yields `reference` again. A reference that
    /// retains characters carries those retains into the inverse, which then
    /// reuses text the target already holds instead of re-inserting it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use synckit_collab::changeset::{Changeset, Strip};
    ///
    /// let base = Changeset::from_text("preexisting text value");
    /// let change = Changeset::from_strips(vec![
    ///     Strip::retain(0, 10),
    ///     Strip::insert(" fill"),
    ///     Strip::retain(11, 21),
    /// ]).unwrap();
    ///
    /// let inverse = change.inverse(&base).unwrap();
    /// assert_eq!(inverse.to_string(), "[[0,10],[16,26]]");
    /// ```
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `reference` is shorter than this changeset's base,
    /// `InvalidChangeset` if the retains taken from `reference` do not fit
    /// between the retained characters of the result.
    pub fn inverse(&self, reference: &Changeset) -> Result<Changeset> {
        let base_len = reference.len();
        if self.base_len() > base_len {
            return Err(SyncError::OutOfRange {
                index: self.base_len() - 1,
                length: base_len,
            });
        }

        let mut strips = Vec::with_capacity(self.strips.len() + reference.strips.len());
        let mut cursor = 0;
        let mut out = 0;
        for strip in &self.strips {
            match strip {
                Strip::Insert(value) => out += value.chars().count(),
                Strip::Retain { start, end } => {
                    if *start > cursor {
                        strips.extend(reference.slice(cursor, *start)?.strips);
                    }
                    let len = end - start + 1;
                    strips.push(Strip::retain(out, out + len - 1));
                    out += len;
                    cursor = end + 1;
                }
            }
        }
        if cursor < base_len {
            strips.extend(reference.slice(cursor, base_len)?.strips);
        }

        Changeset::from_strips(strips)
    }

    /// Result index of the retained character whose base index is the
    /// greatest one not exceeding `index`.
    pub fn index_of_closest_retained(&self, index: usize) -> Option<usize> {
        let mut out = 0;
        let mut closest = None;
        for strip in &self.strips {
            match strip {
                Strip::Insert(value) => out += value.chars().count(),
                Strip::Retain { start, end } => {
                    if *start > index {
                        break;
                    }
                    closest = Some(out + (*end).min(index) - start);
                    out += end - start + 1;
                }
            }
        }
        closest
    }

    /// Map a caret (a gap between base characters) through this changeset.
    pub fn follow_index(&self, caret: usize) -> usize {
        if caret == 0 {
            return 0;
        }
        self.index_of_closest_retained(caret - 1)
            .map_or(0, |index| index + 1)
    }
}

impl std::fmt::Display for Changeset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, strip) in self.strips.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", strip)?;
        }
        write!(f, "]")
    }
}

/// Incremental changeset construction with compaction.
///
/// Used by the algebra, which emits strips in increasing retain order; no
/// validation is done here.
#[derive(Debug, Default)]
pub struct ChangesetBuilder {
    strips: Vec<Strip>,
    len: usize,
}

impl ChangesetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strip, merging it with the previous one where possible
    pub fn push(&mut self, strip: Strip) {
        if strip.is_empty() {
            return;
        }
        debug_assert!(
            match (&strip, self.last_retain_end()) {
                (Strip::Retain { start, .. }, Some(end)) => *start > end,
                _ => true,
            },
            "retains must be strictly increasing"
        );
        self.len += strip.len();
        if let Some(last) = self.strips.last_mut() {
            if last.try_extend(&strip) {
                return;
            }
        }
        self.strips.push(strip);
    }

    /// Retain `len` characters starting at `start`; no-op for `len == 0`
    pub fn retain(&mut self, start: usize, len: usize) {
        if len > 0 {
            self.push(Strip::retain(start, start + len - 1));
        }
    }

    pub fn insert(&mut self, text: &str) {
        if !text.is_empty() {
            self.push(Strip::insert(text));
        }
    }

    fn last_retain_end(&self) -> Option<usize> {
        self.strips.iter().rev().find_map(|strip| match strip {
            Strip::Retain { end, .. } => Some(*end),
            Strip::Insert(_) => None,
        })
    }

    pub fn build(self) -> Changeset {
        Changeset {
            strips: self.strips,
            len: self.len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cs(strips: Vec<Strip>) -> Changeset {
        Changeset::from_strips(strips).unwrap()
    }

    #[test]
    fn test_empty_and_identity() {
        assert!(Changeset::empty().is_empty());
        assert!(Changeset::empty().is_identity_for(0));
        assert_eq!(Changeset::identity(0), Changeset::empty());

        let identity = Changeset::identity(5);
        assert_eq!(identity.strips(), &[Strip::retain(0, 4)]);
        assert!(identity.is_identity_for(5));
        assert!(!identity.is_identity_for(6));
    }

    #[test]
    fn test_from_strips_compacts() {
        let changeset = cs(vec![
            Strip::retain(0, 1),
            Strip::retain(2, 3),
            Strip::insert("a"),
            Strip::insert("b"),
            Strip::insert(""),
        ]);
        assert_eq!(
            changeset.strips(),
            &[Strip::retain(0, 3), Strip::insert("ab")]
        );
        assert_eq!(changeset.len(), 6);
    }

    #[test]
    fn test_from_strips_rejects_unordered() {
        let result = Changeset::from_strips(vec![Strip::retain(3, 5), Strip::retain(1, 2)]);
        assert!(matches!(result, Err(SyncError::InvalidChangeset(_))));

        let result = Changeset::from_strips(vec![Strip::retain(0, 5), Strip::retain(5, 6)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_text_helpers() {
        let text = Changeset::from_text("hello");
        assert!(text.is_text());
        assert_eq!(text.to_text().as_deref(), Some("hello"));
        assert_eq!(Changeset::identity(3).to_text(), None);
        assert_eq!(Changeset::from_text(""), Changeset::empty());
    }

    #[test]
    fn test_compose_text() {
        let base = Changeset::from_text("server");
        let change = cs(vec![Strip::retain(0, 5), Strip::insert(": submit this")]);
        let result = base.compose(&change).unwrap();
        assert_eq!(result.to_text().unwrap(), "server: submit this");
    }

    #[test]
    fn test_compose_changesets() {
        // "abcdef" -> "abXdef" -> "bXd"
        let first = cs(vec![Strip::retain(0, 1), Strip::insert("X"), Strip::retain(3, 5)]);
        let second = cs(vec![Strip::retain(1, 3)]);
        let composed = first.compose(&second).unwrap();
        assert_eq!(
            composed.strips(),
            &[Strip::retain(1, 1), Strip::insert("X"), Strip::retain(3, 3)]
        );
        assert_eq!(composed.apply("abcdef").unwrap(), "bXd");
    }

    #[test]
    fn test_compose_out_of_range() {
        let base = Changeset::from_text("abc");
        let change = cs(vec![Strip::retain(0, 3)]);
        assert!(matches!(
            base.compose(&change),
            Err(SyncError::OutOfRange { index: 3, length: 3 })
        ));
    }

    #[test]
    fn test_slice() {
        let changeset = cs(vec![Strip::insert("ab"), Strip::retain(4, 7), Strip::insert("cd")]);
        let slice = changeset.slice(1, 7).unwrap();
        assert_eq!(
            slice.strips(),
            &[Strip::insert("b"), Strip::retain(4, 7), Strip::insert("c")]
        );
        assert!(changeset.slice(0, 9).is_err());
    }

    #[test]
    fn test_inverse_insert_into_empty() {
        let change = Changeset::from_text("hello");
        let inverse = change.inverse(&Changeset::empty()).unwrap();
        assert_eq!(inverse, Changeset::empty());
    }

    #[test]
    fn test_inverse_restores_deleted() {
        let base = Changeset::from_text("abcdef");
        let change = cs(vec![Strip::retain(1, 2), Strip::insert("XY"), Strip::retain(5, 5)]);
        let inverse = change.inverse(&base).unwrap();
        let after = base.compose(&change).unwrap();
        assert_eq!(after.to_text().unwrap(), "bcXYf");
        assert_eq!(after.compose(&inverse).unwrap(), base);
    }

    #[test]
    fn test_inverse_against_retaining_reference() {
        // "abcd" -> "abd": "bc" deleted, "b" retyped
        let base = Changeset::from_text("abcd");
        let change = cs(vec![Strip::retain(0, 0), Strip::insert("b"), Strip::retain(3, 3)]);
        let after = base.compose(&change).unwrap();
        assert_eq!(after.to_text().unwrap(), "abd");

        // "abcd" described on top of "abd"
        let reference = cs(vec![Strip::retain(0, 1), Strip::insert("c"), Strip::retain(2, 2)]);
        let inverse = change.inverse(&reference).unwrap();
        assert_eq!(inverse, reference);
        assert_eq!(after.compose(&inverse).unwrap(), base);
    }

    #[test]
    fn test_inverse_rejects_unfit_reference() {
        let change = cs(vec![Strip::retain(0, 0), Strip::retain(2, 2)]);
        assert!(matches!(
            change.inverse(&Changeset::identity(3)),
            Err(SyncError::InvalidChangeset(_))
        ));
        assert!(matches!(
            change.inverse(&Changeset::from_text("a")),
            Err(SyncError::OutOfRange { index: 2, length: 1 })
        ));
    }

    #[test]
    fn test_index_of_closest_retained() {
        // base "abcdef", result "Xab" + "def"? -> [ "X", [0,1], [3,5] ]
        let change = cs(vec![Strip::insert("X"), Strip::retain(0, 1), Strip::retain(3, 5)]);
        assert_eq!(change.index_of_closest_retained(0), Some(1));
        assert_eq!(change.index_of_closest_retained(2), Some(2));
        assert_eq!(change.index_of_closest_retained(4), Some(4));

        let deleted_prefix = cs(vec![Strip::retain(3, 4)]);
        assert_eq!(deleted_prefix.index_of_closest_retained(1), None);
    }

    #[test]
    fn test_follow_index() {
        // "hello world" -> "hello brave world"
        let change = cs(vec![Strip::retain(0, 5), Strip::insert("brave "), Strip::retain(6, 10)]);
        assert_eq!(change.follow_index(0), 0);
        assert_eq!(change.follow_index(3), 3);
        assert_eq!(change.follow_index(8), 14);
        assert_eq!(change.follow_index(11), 17);
    }

    #[test]
    fn test_display() {
        let change = cs(vec![Strip::retain(0, 10), Strip::insert(" fill"), Strip::retain(11, 21)]);
        assert_eq!(change.to_string(), "[[0,10],\" fill\",[11,21]]");
    }
}
