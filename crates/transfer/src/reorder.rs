//! Index-addressed reorder buffer.
//!
//! Chunks arrive in completion order; the sink must see them in sequence
//! order. Each slot holds at most one chunk and is released as soon as every
//! earlier slot has been written.

use bytes::Bytes;

/// Error returned for a slot that is out of range or already filled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReorderError {
    #[error("slot {index} out of range (capacity {capacity})")]
    OutOfRange { index: usize, capacity: usize },
    #[error("slot {0} delivered twice")]
    Duplicate(usize),
}

#[derive(Debug)]
pub struct ReorderBuffer {
    slots: Vec<Option<Bytes>>,
    next: usize,
    buffered_bytes: usize,
}

impl ReorderBuffer {
    /// Creates a buffer expecting `capacity` chunks, indexed `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            next: 0,
            buffered_bytes: 0,
        }
    }

    pub fn insert(&mut self, index: usize, data: Bytes) -> Result<(), ReorderError> {
        let capacity = self.slots.len();
        if index >= capacity {
            return Err(ReorderError::OutOfRange { index, capacity });
        }
        if index < self.next || self.slots[index].is_some() {
            return Err(ReorderError::Duplicate(index));
        }
        self.buffered_bytes += data.len();
        self.slots[index] = Some(data);
        Ok(())
    }

    /// Takes the next in-order chunk if it has arrived.
    pub fn pop_ready(&mut self) -> Option<Bytes> {
        let data = self.slots.get_mut(self.next)?.take()?;
        self.next += 1;
        self.buffered_bytes -= data.len();
        Some(data)
    }

    /// Index of the next chunk to be written.
    pub fn next_expected(&self) -> usize {
        self.next
    }

    /// Bytes held waiting for an earlier chunk.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    pub fn is_complete(&self) -> bool {
        self.next == self.slots.len()
    }
}
