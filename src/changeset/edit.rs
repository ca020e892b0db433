//! Caret-relative edit intents
//!
//! Turns "insert this text" or "delete n characters" at the current
//! selection into a changeset, its inverse, and the caret afterwards.

use super::revision::SelectionRange;
use super::set::{Changeset, ChangesetBuilder};
use crate::error::Result;

/// A local edit ready to be composed into the document and the history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOperation {
    /// Change composable on the text the intent was issued against
    pub changeset: Changeset,

    /// Change restoring that text
    pub inverse: Changeset,

    /// Selection after the edit
    pub selection: SelectionRange,
}

/// Replace `selection` in `document` (plain text) with `text`.
///
/// The selection is clamped to the document first.
///
/// # Example
///
/// ```rust
/// use synckit_collab::changeset::{insertion_operation, Changeset, SelectionRange};
///
/// let document = Changeset::from_text("preexisting text value");
/// let op = insertion_operation(" fill", SelectionRange::caret(11), &document).unwrap();
///
/// assert_eq!(op.changeset.to_string(), "[[0,10],\" fill\",[11,21]]");
/// assert_eq!(op.inverse.to_string(), "[[0,10],[16,26]]");
/// assert_eq!(op.selection, SelectionRange::caret(16));
/// ```
pub fn insertion_operation(
    text: &str,
    selection: SelectionRange,
    document: &Changeset,
) -> Result<EditOperation> {
    let len = document.len();
    let selection = selection.clamp(len);

    let mut builder = ChangesetBuilder::new();
    builder.retain(0, selection.start);
    builder.insert(text);
    builder.retain(selection.end, len - selection.end);
    let changeset = builder.build();
    let inverse = changeset.inverse(document)?;

    Ok(EditOperation {
        changeset,
        inverse,
        selection: SelectionRange::caret(selection.start + text.chars().count()),
    })
}

/// Delete around `selection` in `document` (plain text).
///
/// A non-collapsed selection is deleted as a whole. Otherwise a positive
/// `count` deletes backwards from the caret and a negative one forwards.
/// Returns `None` when nothing would be deleted.
pub fn deletion_count_operation(
    count: isize,
    selection: SelectionRange,
    document: &Changeset,
) -> Result<Option<EditOperation>> {
    let len = document.len();
    let selection = selection.clamp(len);

    let (from, to) = if !selection.is_collapsed() {
        (selection.start, selection.end)
    } else if count >= 0 {
        (selection.start.saturating_sub(count.unsigned_abs()), selection.start)
    } else {
        (selection.start, (selection.start + count.unsigned_abs()).min(len))
    };
    if from == to {
        return Ok(None);
    }

    let mut builder = ChangesetBuilder::new();
    builder.retain(0, from);
    builder.retain(to, len - to);
    let changeset = builder.build();
    let inverse = changeset.inverse(document)?;

    Ok(Some(EditOperation {
        changeset,
        inverse,
        selection: SelectionRange::caret(from),
    }))
}
