//! Holds handshake fragments until they can be released in message_seq order.

use std::collections::BTreeMap;
use std::fmt;

use crate::message::Header;

/// Outcome of [`ReorderBuffer::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Insert {
    /// Held until its turn.
    Held,
    /// message_seq below the next expected one.
    Duplicate,
    /// Same fragment is already held.
    AlreadyHeld,
    /// Capacity reached, fragment dropped.
    Full,
}

/// Orders handshake fragments by `(message_seq, fragment_offset)`.
///
/// Only fragments of the next expected message_seq are released. Later
/// ones wait for the gap to fill, earlier ones are duplicates.
pub(crate) struct ReorderBuffer {
    next_seq: u16,
    max: usize,
    held: BTreeMap<(u16, u32), (Header, Vec<u8>)>,
}

impl ReorderBuffer {
    pub fn new(max: usize) -> Self {
        ReorderBuffer {
            next_seq: 0,
            max,
            held: BTreeMap::new(),
        }
    }

    /// The message_seq expected next.
    pub fn next_seq(&self) -> u16 {
        self.next_seq
    }

    pub fn is_duplicate(&self, header: &Header) -> bool {
        header.message_seq < self.next_seq
    }

    pub fn insert(&mut self, header: Header, fragment: &[u8]) -> Insert {
        if self.is_duplicate(&header) {
            return Insert::Duplicate;
        }

        let key = (header.message_seq, header.fragment_offset);
        if self.held.contains_key(&key) {
            return Insert::AlreadyHeld;
        }

        if self.held.len() >= self.max {
            return Insert::Full;
        }

        self.held.insert(key, (header, fragment.to_vec()));
        Insert::Held
    }

    /// Next fragment of the expected message, lowest offset first.
    pub fn pop_ready(&mut self) -> Option<(Header, Vec<u8>)> {
        let key = *self.held.keys().next()?;
        if key.0 != self.next_seq {
            return None;
        }
        self.held.remove(&key)
    }

    /// The expected message completed; move on to the next.
    pub fn advance(&mut self) {
        self.next_seq = self.next_seq.wrapping_add(1);
        let next = self.next_seq;
        self.held.retain(|(seq, _), _| *seq >= next);
    }

    /// Expect `seq` next, forgetting anything held below it.
    pub fn skip_to(&mut self, seq: u16) {
        self.next_seq = seq;
        self.held.retain(|(s, _), _| *s >= seq);
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}

impl fmt::Debug for ReorderBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<_> = self.held.keys().collect();
        f.debug_struct("ReorderBuffer")
            .field("next_seq", &self.next_seq)
            .field("held", &keys)
            .finish()
    }
}
