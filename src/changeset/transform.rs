//! Operational transformation over changesets
//!
//! `follow` rebases one change over a concurrent one, `swap_changes`
//! reorders two sequential changes, and `insertions_to_retained` collapses
//! insertions that reproduce text already present in the base.
//!
//! Internally both sides are walked as a sequence of base ops: every retain
//! strip becomes a `Keep` of base characters, preceded by a `Delete` for
//! any gap before it, and every insert strip an `Insert` positioned at the
//! base cursor right after the previous retain.

use super::set::{Changeset, ChangesetBuilder};
use super::strip::Strip;
use crate::error::{Result, SyncError};

/// A changeset viewed as operations over its base text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseOp<'a> {
    Keep { start: usize, len: usize },
    Delete { start: usize, len: usize },
    Insert(&'a str),
}

fn base_ops(changeset: &Changeset) -> Vec<BaseOp<'_>> {
    let mut ops = Vec::with_capacity(changeset.strips().len() * 2);
    let mut cursor = 0;
    for strip in changeset.strips() {
        match strip {
            Strip::Insert(text) => ops.push(BaseOp::Insert(text)),
            Strip::Retain { start, end } => {
                if *start > cursor {
                    ops.push(BaseOp::Delete {
                        start: cursor,
                        len: start - cursor,
                    });
                }
                ops.push(BaseOp::Keep {
                    start: *start,
                    len: end - start + 1,
                });
                cursor = end + 1;
            }
        }
    }
    ops
}

/// Cursor over base ops that can consume ops partially.
struct OpCursor<'a> {
    ops: Vec<BaseOp<'a>>,
    idx: usize,
    current: Option<BaseOp<'a>>,
}

impl<'a> OpCursor<'a> {
    fn new(changeset: &'a Changeset) -> Self {
        let ops = base_ops(changeset);
        let current = ops.first().copied();
        Self {
            ops,
            idx: 0,
            current,
        }
    }

    fn peek(&self) -> Option<BaseOp<'a>> {
        self.current
    }

    fn advance(&mut self) {
        self.idx += 1;
        self.current = self.ops.get(self.idx).copied();
    }

    /// Consume `n` characters of the current op
    fn consume(&mut self, n: usize) {
        let Some(op) = self.current else {
            return;
        };
        let remaining = match op {
            BaseOp::Keep { start, len } if n < len => Some(BaseOp::Keep {
                start: start + n,
                len: len - n,
            }),
            BaseOp::Delete { start, len } if n < len => Some(BaseOp::Delete {
                start: start + n,
                len: len - n,
            }),
            BaseOp::Insert(text) => match text.char_indices().nth(n) {
                Some((byte, _)) => Some(BaseOp::Insert(&text[byte..])),
                None => None,
            },
            _ => None,
        };
        match remaining {
            Some(rest) => self.current = Some(rest),
            None => self.advance(),
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Builds a changeset addressed in result positions of a left-hand change.
struct FollowBuilder {
    builder: ChangesetBuilder,
    position: usize,
}

impl FollowBuilder {
    fn new() -> Self {
        Self {
            builder: ChangesetBuilder::new(),
            position: 0,
        }
    }

    fn retain(&mut self, len: usize) {
        self.builder.retain(self.position, len);
        self.position += len;
    }

    fn skip(&mut self, len: usize) {
        self.position += len;
    }

    fn insert(&mut self, text: &str) {
        self.builder.insert(text);
    }
}

impl Changeset {
    /// Rebase `other` over `self`.
    ///
    /// Both changesets must be composable on the same base. The result is
    /// composable on `base ∘ self` and preserves the intent of `other`:
    /// characters inserted by `self` are kept, characters both sides retain
    /// are kept, insertions of `other` are added. Insertions both sides make
    /// at the same position are ordered by comparing their text, which makes
    /// `a ∘ a.follow(b) == b ∘ b.follow(a)`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use synckit_collab::changeset::{Changeset, Strip};
    ///
    /// let base = Changeset::from_text("ab");
    /// let a = Changeset::from_strips(vec![Strip::retain(0, 1), Strip::insert("x")]).unwrap();
    /// let b = Changeset::from_strips(vec![Strip::insert("y"), Strip::retain(0, 1)]).unwrap();
    ///
    /// let left = base.compose(&a).unwrap().compose(&a.follow(&b)).unwrap();
    /// let right = base.compose(&b).unwrap().compose(&b.follow(&a)).unwrap();
    /// assert_eq!(left.to_text().unwrap(), "yabx");
    /// assert_eq!(left, right);
    /// ```
    pub fn follow(&self, other: &Changeset) -> Changeset {
        let mut a = OpCursor::new(self);
        let mut b = OpCursor::new(other);
        let mut out = FollowBuilder::new();

        loop {
            match (a.peek(), b.peek()) {
                (None, None) => break,
                (Some(BaseOp::Insert(left)), Some(BaseOp::Insert(right))) => {
                    if left <= right {
                        out.retain(char_len(left));
                        a.advance();
                    } else {
                        out.insert(right);
                        b.advance();
                    }
                }
                (Some(BaseOp::Insert(left)), _) => {
                    out.retain(char_len(left));
                    a.advance();
                }
                (_, Some(BaseOp::Insert(right))) => {
                    out.insert(right);
                    b.advance();
                }
                (Some(left), Some(right)) => {
                    let (left_len, left_kept) = kept_len(left);
                    let (right_len, right_kept) = kept_len(right);
                    let n = left_len.min(right_len);
                    match (left_kept, right_kept) {
                        (true, true) => out.retain(n),
                        (true, false) => out.skip(n),
                        (false, _) => {}
                    }
                    a.consume(n);
                    b.consume(n);
                }
                // `other` dropped the rest of the base
                (Some(left), None) => {
                    let (len, kept) = kept_len(left);
                    if kept {
                        out.skip(len);
                    }
                    a.consume(len);
                }
                // `self` dropped the rest of the base
                (None, Some(right)) => {
                    let (len, _) = kept_len(right);
                    b.consume(len);
                }
            }
        }

        let result = out.builder.build();
        tracing::trace!(left = %self, right = %other, result = %result, "followed changeset");
        result
    }

    /// Reorder two sequential changes on this base text.
    ///
    /// `first` is composable on `self`, `second` on `self ∘ first`. Returns
    /// `(second', first')` with `self ∘ first ∘ second == self ∘ second' ∘ first'`.
    /// `first'` keeps the deletions of `first` and those of its insertions
    /// that `second` kept; `second'` carries the insertions of `second` and
    /// its deletions of base characters.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::OutOfRange` if `first` does not fit this base or
    /// `second` does not fit `self ∘ first`.
    pub fn swap_changes(&self, first: &Changeset, second: &Changeset) -> Result<(Changeset, Changeset)> {
        if first.base_len() > self.len() {
            return Err(SyncError::OutOfRange {
                index: first.base_len() - 1,
                length: self.len(),
            });
        }
        if second.base_len() > first.len() {
            return Err(SyncError::OutOfRange {
                index: second.base_len() - 1,
                length: first.len(),
            });
        }

        let atoms = swap_atoms(first, second);

        let mut second_prime = ChangesetBuilder::new();
        let mut first_prime = ChangesetBuilder::new();
        let mut second_out = 0;
        for atom in &atoms {
            match atom {
                SwapAtom::BaseKept { start, len } => {
                    second_prime.retain(*start, *len);
                    first_prime.retain(second_out, *len);
                    second_out += len;
                }
                SwapAtom::BaseDeletedByFirst { start, len } => {
                    second_prime.retain(*start, *len);
                    second_out += len;
                }
                SwapAtom::BaseDeletedBySecond => {}
                SwapAtom::SecondInsert(text) => {
                    let len = char_len(text);
                    second_prime.insert(text);
                    first_prime.retain(second_out, len);
                    second_out += len;
                }
                SwapAtom::FirstInsertKept(text) => first_prime.insert(text),
            }
        }

        Ok((second_prime.build(), first_prime.build()))
    }

    /// Turn insertions in `other` into retains where `self` (plain text)
    /// already holds the same text at the insertion point.
    ///
    /// `other` must be composable on `self`. A change that deletes and
    /// retypes identical text collapses to retaining it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use synckit_collab::changeset::{Changeset, Strip};
    ///
    /// let base = Changeset::from_text("abcd");
    /// let retyped = Changeset::from_strips(vec![Strip::insert("ab"), Strip::retain(2, 3)]).unwrap();
    /// assert_eq!(base.insertions_to_retained(&retyped), Changeset::identity(4));
    /// ```
    pub fn insertions_to_retained(&self, other: &Changeset) -> Changeset {
        let Some(text) = self.to_text() else {
            return other.clone();
        };
        let base: Vec<char> = text.chars().collect();
        let strips = other.strips();
        let mut builder = ChangesetBuilder::new();
        let mut cursor = 0;

        for (i, strip) in strips.iter().enumerate() {
            match strip {
                Strip::Retain { end, .. } => {
                    builder.push(strip.clone());
                    cursor = end + 1;
                }
                Strip::Insert(value) => {
                    let next_retained = strips[i + 1..]
                        .iter()
                        .find_map(|s| match s {
                            Strip::Retain { start, .. } => Some(*start),
                            Strip::Insert(_) => None,
                        })
                        .unwrap_or(base.len());
                    let len = char_len(value);
                    let fits = cursor + len <= next_retained.min(base.len());
                    if fits && base[cursor..cursor + len].iter().copied().eq(value.chars()) {
                        builder.retain(cursor, len);
                        cursor += len;
                    } else {
                        builder.push(strip.clone());
                    }
                }
            }
        }

        builder.build()
    }
}

fn kept_len(op: BaseOp<'_>) -> (usize, bool) {
    match op {
        BaseOp::Keep { len, .. } => (len, true),
        BaseOp::Delete { len, .. } => (len, false),
        BaseOp::Insert(text) => (char_len(text), true),
    }
}

/// Where each piece of `base ∘ first ∘ second` comes from, in result order.
#[derive(Debug, PartialEq, Eq)]
enum SwapAtom {
    BaseKept { start: usize, len: usize },
    BaseDeletedByFirst { start: usize, len: usize },
    BaseDeletedBySecond,
    FirstInsertKept(String),
    SecondInsert(String),
}

fn swap_atoms(first: &Changeset, second: &Changeset) -> Vec<SwapAtom> {
    let mut x = OpCursor::new(first);
    let mut y = OpCursor::new(second);
    let mut atoms = Vec::new();

    loop {
        while let Some(BaseOp::Delete { start, len }) = x.peek() {
            atoms.push(SwapAtom::BaseDeletedByFirst { start, len });
            x.advance();
        }

        match y.peek() {
            Some(BaseOp::Insert(text)) => {
                atoms.push(SwapAtom::SecondInsert(text.to_string()));
                y.advance();
            }
            Some(op) => {
                let (y_len, kept) = kept_len(op);
                match x.peek() {
                    Some(BaseOp::Keep { start, len }) => {
                        let n = y_len.min(len);
                        atoms.push(if kept {
                            SwapAtom::BaseKept { start, len: n }
                        } else {
                            SwapAtom::BaseDeletedBySecond
                        });
                        x.consume(n);
                        y.consume(n);
                    }
                    Some(BaseOp::Insert(text)) => {
                        let n = y_len.min(char_len(text));
                        if kept {
                            atoms.push(SwapAtom::FirstInsertKept(text.chars().take(n).collect()));
                        }
                        x.consume(n);
                        y.consume(n);
                    }
                    // lengths were validated by the caller
                    Some(BaseOp::Delete { .. }) | None => break,
                }
            }
            None => match x.peek() {
                None => break,
                Some(BaseOp::Keep { len, .. }) => {
                    atoms.push(SwapAtom::BaseDeletedBySecond);
                    x.consume(len);
                }
                Some(op) => {
                    let (len, _) = kept_len(op);
                    x.consume(len);
                }
            },
        }
    }

    atoms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cs(strips: Vec<Strip>) -> Changeset {
        Changeset::from_strips(strips).unwrap()
    }

    fn text(value: &str) -> Changeset {
        Changeset::from_text(value)
    }

    #[test]
    fn test_follow_keeps_both_inserts() {
        let base = text("hello");
        let a = cs(vec![Strip::retain(0, 4), Strip::insert(" world")]);
        let b = cs(vec![Strip::insert("oh, "), Strip::retain(0, 4)]);

        let b_prime = a.follow(&b);
        let result = base.compose(&a).unwrap().compose(&b_prime).unwrap();
        assert_eq!(result.to_text().unwrap(), "oh, hello world");
    }

    #[test]
    fn test_follow_intersects_retains() {
        // a deletes "b", b deletes "d"
        let base = text("abcde");
        let a = cs(vec![Strip::retain(0, 0), Strip::retain(2, 4)]);
        let b = cs(vec![Strip::retain(0, 2), Strip::retain(4, 4)]);

        let left = base.compose(&a).unwrap().compose(&a.follow(&b)).unwrap();
        let right = base.compose(&b).unwrap().compose(&b.follow(&a)).unwrap();
        assert_eq!(left.to_text().unwrap(), "ace");
        assert_eq!(left, right);
    }

    #[test]
    fn test_follow_same_position_tie_break() {
        let base = text("");
        let a = text("b");
        let b = text("a");

        let left = base.compose(&a).unwrap().compose(&a.follow(&b)).unwrap();
        let right = base.compose(&b).unwrap().compose(&b.follow(&a)).unwrap();
        assert_eq!(left.to_text().unwrap(), "ab");
        assert_eq!(left, right);
    }

    #[test]
    fn test_follow_equal_inserts() {
        let a = text("same");
        let left = a.compose(&a.follow(&a)).unwrap();
        assert_eq!(left.to_text().unwrap(), "samesame");
    }

    #[test]
    fn test_follow_insert_inside_deleted_range() {
        // a deletes everything, b inserts in the middle
        let base = text("abcd");
        let a = Changeset::empty();
        let b = cs(vec![Strip::retain(0, 1), Strip::insert("X"), Strip::retain(2, 3)]);

        let b_prime = a.follow(&b);
        assert_eq!(b_prime, text("X"));
        let a_prime = b.follow(&a);
        assert_eq!(base.compose(&b).unwrap().compose(&a_prime).unwrap(), text("X"));
    }

    #[test]
    fn test_follow_identity() {
        let a = cs(vec![Strip::retain(0, 2), Strip::insert("!")]);
        let identity = Changeset::identity(3);
        assert_eq!(a.follow(&identity), Changeset::identity(4));
        assert_eq!(identity.follow(&a), a);
    }

    #[test]
    fn test_swap_changes_reproduces_text() {
        let base = text("hello world");
        // first: delete "hello " ; second: insert "big " before "world" and "!" at end
        let first = cs(vec![Strip::retain(6, 10)]);
        let second = cs(vec![Strip::insert("big "), Strip::retain(0, 4), Strip::insert("!")]);

        let (second_prime, first_prime) = base.swap_changes(&first, &second).unwrap();
        let expected = base.compose(&first).unwrap().compose(&second).unwrap();
        let swapped = base.compose(&second_prime).unwrap().compose(&first_prime).unwrap();
        assert_eq!(expected.to_text().unwrap(), "big world!");
        assert_eq!(swapped, expected);

        // the deletion stays with first'
        assert_eq!(base.compose(&second_prime).unwrap().to_text().unwrap(), "hello big world!");
    }

    #[test]
    fn test_swap_changes_second_deletes_first_insert() {
        let base = text("ab");
        let first = cs(vec![Strip::retain(0, 0), Strip::insert("XYZ"), Strip::retain(1, 1)]);
        // "aXYZb" -> "aXb"
        let second = cs(vec![Strip::retain(0, 1), Strip::retain(4, 4)]);

        let (second_prime, first_prime) = base.swap_changes(&first, &second).unwrap();
        assert_eq!(second_prime, Changeset::identity(2));
        assert_eq!(first_prime, cs(vec![Strip::retain(0, 0), Strip::insert("X"), Strip::retain(1, 1)]));
    }

    #[test]
    fn test_swap_changes_validates_lengths() {
        let base = text("ab");
        let first = cs(vec![Strip::retain(0, 4)]);
        assert!(base.swap_changes(&first, &Changeset::empty()).is_err());
    }

    #[test]
    fn test_insertions_to_retained_collapses_retype() {
        let base = text("abcd");
        let change = cs(vec![Strip::retain(0, 0), Strip::insert("bc"), Strip::retain(3, 3)]);
        assert_eq!(base.insertions_to_retained(&change), Changeset::identity(4));
    }

    #[test]
    fn test_insertions_to_retained_keeps_new_text() {
        let base = text("abcd");
        let change = cs(vec![Strip::retain(0, 1), Strip::insert("bc"), Strip::retain(2, 3)]);
        assert_eq!(base.insertions_to_retained(&change), change);

        let differs = cs(vec![Strip::retain(0, 0), Strip::insert("xy"), Strip::retain(3, 3)]);
        assert_eq!(base.insertions_to_retained(&differs), differs);
    }
}
