//! Undo/redo stack anchored at a tail text
//!
//! ```text
//! tail ─e0─▶ T1 ─e1─▶ T2 ─e2─▶ T3
//!                      ▲
//!                    index = 2 (e2 is a redo frame)
//! ```
//!
//! Composing the tail with the executes of the applied entries gives the
//! head text, which always equals the editor view. External changes are
//! folded in with [`EditorHistory::compose_on_all_entries`]: they are
//! swapped underneath the applied entries into the tail, so undoing a local
//! edit never reverts someone else's text.

use super::entry::{HistoryEdit, HistoryEntry, HistoryOperation, RestoredEntry};
use crate::changeset::{Changeset, Revision, SelectionRange};
use crate::error::{Result, SyncError};

/// Linear undo/redo history for one text.
///
/// # Example
///
/// ```rust
/// use synckit_collab::changeset::{insertion_operation, Changeset, SelectionRange};
/// use synckit_collab::history::{EditorHistory, HistoryEdit};
///
/// let tail = Changeset::from_text("abc");
/// let mut history = EditorHistory::new(tail.clone(), 0, 100);
///
/// let op = insertion_operation("X", SelectionRange::caret(3), &tail).unwrap();
/// history
///     .push(HistoryEdit::new(op.changeset, SelectionRange::caret(3), op.selection).with_undo(op.inverse))
///     .unwrap();
/// assert_eq!(history.head().to_text().unwrap(), "abcX");
///
/// let undo = history.undo().unwrap().unwrap();
/// assert_eq!(undo.selection, SelectionRange::caret(3));
/// assert_eq!(history.head().to_text().unwrap(), "abc");
/// assert!(history.can_redo());
/// ```
#[derive(Debug, Clone)]
pub struct EditorHistory {
    /// Plain text before the oldest entry
    tail: Changeset,

    /// Server revision whose text the tail was derived from
    tail_revision: Revision,

    /// Change from the text at `tail_revision` to `tail`
    tail_rebase: Changeset,

    entries: Vec<HistoryEntry>,

    /// Number of applied entries
    index: usize,

    /// `tail` composed with the applied entries
    head: Changeset,

    max_entries: usize,
}

impl EditorHistory {
    /// Empty history on plain text `tail` taken at `tail_revision`.
    ///
    /// `max_entries` is clamped to at least one frame.
    pub fn new(tail: Changeset, tail_revision: Revision, max_entries: usize) -> Self {
        Self {
            tail_rebase: tail.to_identity(),
            head: tail.clone(),
            tail,
            tail_revision,
            entries: Vec::new(),
            index: 0,
            max_entries: max_entries.max(1),
        }
    }

    pub fn tail(&self) -> &Changeset {
        &self.tail
    }

    pub fn tail_revision(&self) -> Revision {
        self.tail_revision
    }

    pub fn tail_rebase(&self) -> &Changeset {
        &self.tail_rebase
    }

    pub fn head(&self) -> &Changeset {
        &self.head
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Undo position; entries from here on are redo frames
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index < self.entries.len()
    }

    /// Record a local edit composable on the head.
    ///
    /// Drops redo frames. Identity edits are not recorded. Once the stack
    /// exceeds `max_entries` the oldest frames are folded into the tail.
    pub fn push(&mut self, edit: HistoryEdit) -> Result<()> {
        if edit.changeset.is_identity_for(self.head.len()) {
            return Ok(());
        }
        let undo = match edit.undo {
            Some(undo) => undo,
            None => edit.changeset.inverse(&self.head)?,
        };
        let head = self.head.compose(&edit.changeset)?;

        if self.can_redo() {
            tracing::trace!(dropped = self.entries.len() - self.index, "dropping redo frames");
            self.entries.truncate(self.index);
        }
        self.entries.push(HistoryEntry {
            execute: HistoryOperation::new(edit.changeset, edit.after_selection),
            undo: HistoryOperation::new(undo, edit.before_selection),
        });
        self.index += 1;
        self.head = head;

        if self.entries.len() > self.max_entries {
            self.merge_to_tail(self.entries.len() - self.max_entries)?;
        }
        Ok(())
    }

    /// Step back one entry, returning the operation to apply to the view
    pub fn undo(&mut self) -> Result<Option<HistoryOperation>> {
        let Some(index) = self.index.checked_sub(1) else {
            return Ok(None);
        };
        let operation = self.entries[index].undo.clone();
        self.head = self.head.compose(&operation.changeset)?;
        self.index = index;
        Ok(Some(operation))
    }

    /// Step forward one entry, returning the operation to apply to the view
    pub fn redo(&mut self) -> Result<Option<HistoryOperation>> {
        let Some(entry) = self.entries.get(self.index) else {
            return Ok(None);
        };
        let operation = entry.execute.clone();
        self.head = self.head.compose(&operation.changeset)?;
        self.index += 1;
        Ok(Some(operation))
    }

    /// Rebase every entry over `change`, a change composable on the text
    /// after the first `anchor` entries.
    ///
    /// Entries below `anchor` get `change` swapped underneath them until it
    /// reaches the tail; entries from `anchor` on follow it. Entries that
    /// become no-ops are dropped and every undo is recomputed from the new
    /// tail.
    pub fn compose_on_all_entries(&mut self, change: &Changeset, anchor: usize) -> Result<()> {
        let len = self.entries.len();
        if anchor > len {
            return Err(SyncError::InvalidHistoryRange {
                start: anchor,
                end: anchor,
                len,
                index: self.index,
            });
        }
        let texts = self.texts()?;
        if change.base_len() > texts[anchor].len() {
            return Err(SyncError::OutOfRange {
                index: change.base_len() - 1,
                length: texts[anchor].len(),
            });
        }

        let mut executes: Vec<Changeset> = self.entries[..anchor]
            .iter()
            .map(|entry| entry.execute.changeset.clone())
            .collect();
        let mut rebases = swap_backward(&texts[..anchor], &mut executes, change.clone())?;
        for (entry, execute) in self.entries.iter_mut().zip(executes) {
            entry.execute.changeset = execute;
        }

        for i in anchor..len {
            let execute = &self.entries[i].execute.changeset;
            let rebased_execute = rebases[i].follow(execute);
            let next = execute.follow(&rebases[i]);
            rebases.push(next);
            self.entries[i].execute.changeset = rebased_execute;
        }

        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.undo.selection = entry.undo.selection.follow(&rebases[i]);
            entry.execute.selection = entry.execute.selection.follow(&rebases[i + 1]);
        }

        self.tail = self.tail.compose(&rebases[0])?;
        self.tail_rebase = self.tail_rebase.compose(&rebases[0])?;
        self.rebuild()?;

        tracing::debug!(
            %change,
            anchor,
            entries = self.entries.len(),
            tail_change = %rebases[0],
            "rebased history"
        );
        Ok(())
    }

    /// Prepend history restored from server records.
    ///
    /// `new_tail` is the plain text at `tail_revision`; `restored` holds the
    /// changes from there up to the current tail revision, oldest first.
    /// Tail-only entries are swapped underneath the undoable ones and folded
    /// into the new tail. Returns the number of undo frames added.
    ///
    /// # Errors
    ///
    /// `SyncError::Protocol` if the restored changes do not reproduce the
    /// current tail.
    pub fn unshift(
        &mut self,
        new_tail: Changeset,
        tail_revision: Revision,
        restored: Vec<RestoredEntry>,
    ) -> Result<usize> {
        if tail_revision > self.tail_revision {
            return Err(SyncError::Protocol(format!(
                "restored tail revision {tail_revision} is newer than {}",
                self.tail_revision
            )));
        }
        if !new_tail.is_text() {
            return Err(SyncError::InvalidChangeset(
                "history tail must be plain text".to_string(),
            ));
        }

        let mut replay = new_tail.clone();
        for entry in &restored {
            replay = replay.compose(&entry.changeset).map_err(mismatch)?;
        }
        if replay.compose(&self.tail_rebase).map_err(mismatch)? != self.tail {
            return Err(SyncError::Protocol(
                "restored records do not reproduce the history tail".to_string(),
            ));
        }

        let mut tail = new_tail.clone();
        let mut tail_rebase = new_tail.to_identity();
        let mut frames: Vec<Frame> = Vec::new();
        let pending = restored
            .into_iter()
            .chain(std::iter::once(RestoredEntry::tail_only(self.tail_rebase.clone())));

        for entry in pending {
            if let Some((before, after)) = entry.selections {
                frames.push(Frame {
                    changeset: entry.changeset,
                    before,
                    after,
                });
                continue;
            }

            let texts = chain_texts(&tail, frames.iter().map(|frame| &frame.changeset))?;
            let mut changes: Vec<Changeset> =
                frames.iter().map(|frame| frame.changeset.clone()).collect();
            let rebases = swap_backward(&texts[..frames.len()], &mut changes, entry.changeset)?;
            for (i, (frame, changeset)) in frames.iter_mut().zip(changes).enumerate() {
                frame.changeset = changeset;
                frame.before = frame.before.follow(&rebases[i]);
                frame.after = frame.after.follow(&rebases[i + 1]);
            }
            tail = tail.compose(&rebases[0])?;
            tail_rebase = tail_rebase.compose(&rebases[0])?;
        }

        let added = frames.len();
        let restored_entries = frames.into_iter().map(|frame| HistoryEntry {
            undo: HistoryOperation::new(Changeset::empty(), frame.before),
            execute: HistoryOperation::new(frame.changeset, frame.after),
        });
        self.entries.splice(0..0, restored_entries);
        self.index += added;
        self.tail = tail;
        self.tail_revision = tail_revision;
        self.tail_rebase = tail_rebase;

        let before = self.index;
        self.rebuild()?;
        let kept = added.saturating_sub(before - self.index);

        tracing::debug!(tail_revision, restored = kept, "unshifted history");
        Ok(kept)
    }

    /// Collapse entries `start..end` into one.
    ///
    /// # Errors
    ///
    /// `SyncError::InvalidHistoryRange` for an empty or out-of-bounds range,
    /// or one that straddles the undo position.
    pub fn merge(&mut self, start: usize, end: usize) -> Result<()> {
        let len = self.entries.len();
        if start >= end || end > len || (start < self.index && self.index < end) {
            return Err(SyncError::InvalidHistoryRange {
                start,
                end,
                len,
                index: self.index,
            });
        }
        if end - start == 1 {
            return Ok(());
        }

        let mut execute = self.entries[start].execute.changeset.clone();
        for entry in &self.entries[start + 1..end] {
            execute = execute.compose(&entry.execute.changeset)?;
        }
        let merged = HistoryEntry {
            undo: HistoryOperation::new(Changeset::empty(), self.entries[start].undo.selection),
            execute: HistoryOperation::new(execute, self.entries[end - 1].execute.selection),
        };
        self.entries.splice(start..end, std::iter::once(merged));
        if end <= self.index {
            self.index -= end - start - 1;
        }
        self.rebuild()
    }

    /// Fold the oldest `count` applied entries into the tail.
    ///
    /// Irreversible. `count` is clamped to the undo position; returns the
    /// number of entries folded.
    pub fn merge_to_tail(&mut self, count: usize) -> Result<usize> {
        let count = count.min(self.index);
        if count == 0 {
            return Ok(0);
        }

        let mut tail = self.tail.clone();
        let mut tail_rebase = self.tail_rebase.clone();
        for entry in &self.entries[..count] {
            tail = tail.compose(&entry.execute.changeset)?;
            tail_rebase = tail_rebase.compose(&entry.execute.changeset)?;
        }
        self.entries.drain(..count);
        self.index -= count;
        self.tail = tail;
        self.tail_rebase = tail_rebase;

        tracing::debug!(count, remaining = self.entries.len(), "merged entries into tail");
        Ok(count)
    }

    /// Texts before each entry, followed by the text after the last one
    fn texts(&self) -> Result<Vec<Changeset>> {
        chain_texts(
            &self.tail,
            self.entries.iter().map(|entry| &entry.execute.changeset),
        )
    }

    /// Drop no-op entries, recompute undos and the head
    fn rebuild(&mut self) -> Result<()> {
        let mut text = self.tail.clone();
        let mut head = None;
        let mut index = self.index;
        let mut entries = Vec::with_capacity(self.entries.len());

        for (i, entry) in self.entries.iter().enumerate() {
            if i == self.index {
                head = Some(text.clone());
            }
            if entry.execute.changeset.is_identity_for(text.len()) {
                if i < self.index {
                    index -= 1;
                }
                continue;
            }
            let mut entry = entry.clone();
            entry.undo.changeset = entry.execute.changeset.inverse(&text)?;
            text = text.compose(&entry.execute.changeset)?;
            entries.push(entry);
        }

        self.head = head.unwrap_or(text);
        self.entries = entries;
        self.index = index;
        Ok(())
    }
}

/// An undoable change while unshifting
struct Frame {
    changeset: Changeset,
    before: SelectionRange,
    after: SelectionRange,
}

fn mismatch(err: SyncError) -> SyncError {
    SyncError::Protocol(format!("restored records do not fit the history tail: {err}"))
}

fn chain_texts<'a>(
    start: &Changeset,
    changes: impl Iterator<Item = &'a Changeset>,
) -> Result<Vec<Changeset>> {
    let mut texts = vec![start.clone()];
    for change in changes {
        let next = texts[texts.len() - 1].compose(change)?;
        texts.push(next);
    }
    Ok(texts)
}

/// Move `change`, composable after `changes`, in front of all of them.
///
/// `texts[i]` is the text `changes[i]` applies to. Rewrites `changes` in
/// place and returns `change` as seen at each position, `[0]` being the
/// version composable on `texts[0]`.
fn swap_backward(
    texts: &[Changeset],
    changes: &mut [Changeset],
    change: Changeset,
) -> Result<Vec<Changeset>> {
    let mut rebases = vec![Changeset::empty(); changes.len() + 1];
    rebases[changes.len()] = change;
    for i in (0..changes.len()).rev() {
        let (earlier, moved) = texts[i].swap_changes(&changes[i], &rebases[i + 1])?;
        changes[i] = moved;
        rebases[i] = earlier;
    }
    Ok(rebases)
}
