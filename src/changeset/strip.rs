//! Strip: the unit a changeset is built from
//!
//! A strip either retains an inclusive range of characters from the text the
//! changeset is applied to, or inserts literal text. Strips are never empty;
//! an empty changeset (no strips) is the canonical empty value.

/// One unit of a [`Changeset`](super::Changeset).
///
/// # Example
///
/// ```rust
/// use synckit_collab::changeset::Strip;
///
/// let retain = Strip::retain(2, 5);
/// assert_eq!(retain.len(), 4);
///
/// let insert = Strip::insert("héllo");
/// assert_eq!(insert.len(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Strip {
    /// Literal text inserted into the result
    Insert(String),

    /// Inclusive character range `[start, end]` of the base text
    Retain { start: usize, end: usize },
}

impl Strip {
    /// Create an insert strip
    pub fn insert(text: impl Into<String>) -> Self {
        Strip::Insert(text.into())
    }

    /// Create a retain strip covering `[start, end]`
    ///
    /// # Panics
    ///
    /// Panics if `end < start`; a strip can never be empty.
    pub fn retain(start: usize, end: usize) -> Self {
        assert!(end >= start, "retain strip [{start}, {end}] is empty");
        Strip::Retain { start, end }
    }

    /// Number of characters this strip contributes to the result
    pub fn len(&self) -> usize {
        match self {
            Strip::Insert(text) => text.chars().count(),
            Strip::Retain { start, end } => end - start + 1,
        }
    }

    /// Only an `Insert("")` can be empty; builders drop those.
    pub fn is_empty(&self) -> bool {
        match self {
            Strip::Insert(text) => text.is_empty(),
            Strip::Retain { .. } => false,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Strip::Insert(_))
    }

    pub fn is_retain(&self) -> bool {
        matches!(self, Strip::Retain { .. })
    }

    /// Sub-strip covering result offsets `from..to` of this strip.
    ///
    /// Returns `None` when the range is empty or exceeds the strip.
    pub fn slice(&self, from: usize, to: usize) -> Option<Strip> {
        if from >= to || to > self.len() {
            return None;
        }
        Some(match self {
            Strip::Insert(text) => Strip::Insert(text.chars().skip(from).take(to - from).collect()),
            Strip::Retain { start, .. } => Strip::Retain {
                start: start + from,
                end: start + to - 1,
            },
        })
    }

    /// Try to merge `next` onto the end of `self`.
    ///
    /// Inserts concatenate; retains merge when contiguous.
    pub(crate) fn try_extend(&mut self, next: &Strip) -> bool {
        match (self, next) {
            (Strip::Insert(text), Strip::Insert(more)) => {
                text.push_str(more);
                true
            }
            (Strip::Retain { end, .. }, Strip::Retain { start, end: next_end }) if *end + 1 == *start => {
                *end = *next_end;
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for Strip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strip::Insert(text) => write!(f, "{:?}", text),
            Strip::Retain { start, end } if start == end => write!(f, "{}", start),
            Strip::Retain { start, end } => write!(f, "[{},{}]", start, end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths() {
        assert_eq!(Strip::retain(0, 0).len(), 1);
        assert_eq!(Strip::retain(3, 10).len(), 8);
        assert_eq!(Strip::insert("abc").len(), 3);
        assert_eq!(Strip::insert("👋é").len(), 2);
    }

    #[test]
    #[should_panic]
    fn test_empty_retain_panics() {
        let _ = Strip::retain(4, 3);
    }

    #[test]
    fn test_slice_insert() {
        let strip = Strip::insert("hello");
        assert_eq!(strip.slice(1, 4), Some(Strip::insert("ell")));
        assert_eq!(strip.slice(2, 2), None);
        assert_eq!(strip.slice(0, 6), None);
    }

    #[test]
    fn test_slice_retain() {
        let strip = Strip::retain(10, 19);
        assert_eq!(strip.slice(0, 1), Some(Strip::retain(10, 10)));
        assert_eq!(strip.slice(5, 10), Some(Strip::retain(15, 19)));
    }

    #[test]
    fn test_try_extend() {
        let mut a = Strip::retain(0, 3);
        assert!(a.try_extend(&Strip::retain(4, 6)));
        assert_eq!(a, Strip::retain(0, 6));
        assert!(!a.try_extend(&Strip::retain(8, 9)));

        let mut b = Strip::insert("ab");
        assert!(b.try_extend(&Strip::insert("cd")));
        assert_eq!(b, Strip::insert("abcd"));
        assert!(!b.try_extend(&Strip::retain(0, 0)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Strip::retain(4, 4).to_string(), "4");
        assert_eq!(Strip::retain(0, 10).to_string(), "[0,10]");
        assert_eq!(Strip::insert("x").to_string(), "\"x\"");
    }
}
