//! Queue wrappers whose Debug output shows metadata only.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Outgoing datagrams, each holding one or more records.
pub(crate) struct QueueTx(VecDeque<Vec<u8>>);

impl QueueTx {
    pub fn new() -> Self {
        Self(VecDeque::new())
    }
}

impl Deref for QueueTx {
    type Target = VecDeque<Vec<u8>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for QueueTx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Debug for QueueTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_bytes: usize = self.0.iter().map(|b| b.len()).sum();
        f.debug_struct("QueueTx")
            .field("datagrams", &self.0.len())
            .field("total_bytes", &total_bytes)
            .finish()
    }
}

/// Serialized records of the next epoch, waiting for the peer's ChangeCipherSpec.
pub(crate) struct QueueEpoch(Vec<Vec<u8>>);

impl QueueEpoch {
    pub fn new() -> Self {
        Self(Vec::new())
    }
}

impl Deref for QueueEpoch {
    type Target = Vec<Vec<u8>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for QueueEpoch {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Debug for QueueEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEpoch")
            .field("records", &self.0.len())
            .finish()
    }
}
