//! Ordered message buffer: gap-free, in-order delivery of versioned messages
//!
//! Server messages (acknowledgements, external changes) carry the revision
//! they create. The network may deliver them out of order or more than
//! once. The buffer stashes anything from the future and releases messages
//! strictly in version order, each exactly once.
//!
//! Missing versions are never an error here: the buffer waits. Requesting
//! the gap (see [`OrderedMessageBuffer::missing_versions`]) and giving up
//! after a timeout is the caller's job.

use std::collections::BTreeMap;
use std::ops::Range;

/// Outcome of [`OrderedMessageBuffer::add`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferAdd<M> {
    /// Stale or duplicate version; nothing changed
    Ignored,

    /// Stored until the versions before it arrive
    Stashed,

    /// A batch became deliverable, in increasing version order
    Processed(Vec<(u64, M)>),
}

impl<M> BufferAdd<M> {
    /// Whether the message was accepted (stashed or delivered)
    pub fn is_accepted(&self) -> bool {
        !matches!(self, BufferAdd::Ignored)
    }

    /// Number of messages delivered by this call
    pub fn processed_count(&self) -> usize {
        match self {
            BufferAdd::Processed(messages) => messages.len(),
            _ => 0,
        }
    }

    /// Delivered messages, empty unless `Processed`
    pub fn into_messages(self) -> Vec<(u64, M)> {
        match self {
            BufferAdd::Processed(messages) => messages,
            _ => Vec::new(),
        }
    }
}

/// Sequencer for versioned messages.
///
/// Single-writer: drive it from one event stream per document.
///
/// # Example
///
/// ```rust
/// use synckit_collab::sync::{BufferAdd, OrderedMessageBuffer};
///
/// let mut buffer = OrderedMessageBuffer::new(0);
/// assert_eq!(buffer.add(2, "second"), BufferAdd::Stashed);
///
/// let delivered = buffer.add(1, "first");
/// assert_eq!(delivered, BufferAdd::Processed(vec![(1, "first"), (2, "second")]));
///
/// assert_eq!(buffer.add(1, "again"), BufferAdd::Ignored);
/// assert_eq!(buffer.current_version(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct OrderedMessageBuffer<M> {
    current_version: u64,
    stash: BTreeMap<u64, M>,
    stash_warn_threshold: usize,
}

impl<M> OrderedMessageBuffer<M> {
    /// Create a buffer whose messages up to `current_version` are delivered
    pub fn new(current_version: u64) -> Self {
        Self {
            current_version,
            stash: BTreeMap::new(),
            stash_warn_threshold: usize::MAX,
        }
    }

    /// Log a warning whenever the stash grows past `threshold`
    pub fn with_stash_warn_threshold(mut self, threshold: usize) -> Self {
        self.stash_warn_threshold = threshold;
        self
    }

    /// Version of the last delivered message
    pub fn current_version(&self) -> u64 {
        self.current_version
    }

    /// Number of messages waiting for a gap to close
    pub fn stash_len(&self) -> usize {
        self.stash.len()
    }

    /// Versions the caller should request to unblock the stash.
    ///
    /// Empty when nothing is stashed.
    pub fn missing_versions(&self) -> Range<u64> {
        match self.stash.keys().next() {
            Some(&first) => self.current_version + 1..first,
            None => self.current_version + 1..self.current_version + 1,
        }
    }

    /// Add a message for `version` and deliver whatever became contiguous.
    pub fn add(&mut self, version: u64, message: M) -> BufferAdd<M> {
        if version <= self.current_version || self.stash.contains_key(&version) {
            tracing::trace!(version, current = self.current_version, "ignoring stale message");
            return BufferAdd::Ignored;
        }
        self.stash.insert(version, message);

        let mut delivered = Vec::new();
        while let Some(message) = self.stash.remove(&(self.current_version + 1)) {
            self.current_version += 1;
            delivered.push((self.current_version, message));
        }

        if delivered.is_empty() {
            if self.stash.len() > self.stash_warn_threshold {
                tracing::warn!(
                    stashed = self.stash.len(),
                    current = self.current_version,
                    missing = ?self.missing_versions(),
                    "message stash keeps growing"
                );
            }
            return BufferAdd::Stashed;
        }

        tracing::debug!(
            count = delivered.len(),
            current = self.current_version,
            "messages processed"
        );
        BufferAdd::Processed(delivered)
    }

    /// Drop everything and restart at `version` (after a full resync)
    pub fn reset(&mut self, version: u64) {
        self.current_version = version;
        self.stash.clear();
    }
}

impl<M> Default for OrderedMessageBuffer<M> {
    fn default() -> Self {
        Self::new(0)
    }
}
