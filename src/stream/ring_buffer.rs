//! Growable circular byte buffer.
//!
//! ```text
//!            offset          offset + count (mod capacity)
//!              │                      │
//!  ┌───────────▼──────────────────────▼──────────┐
//!  │  free    │ valid valid valid valid │  free    │
//!  └─────────────────────────────────────────────┘
//! ```
//!
//! Pushes append at the wrap point and pops consume from `offset`; either
//! may be split into two copies when it crosses the end of storage.  When
//! auto-expand is enabled a full buffer doubles (repeatedly, if needed) and
//! the valid bytes are un-wrapped to offset 0 of the new storage.

use crate::error::BufferError;
use crate::pack;

/// Fixed-capacity (optionally growing) FIFO byte store.
pub struct RingBuffer {
    storage: Vec<u8>,
    offset: usize,
    count: usize,
    initial_capacity: usize,
    auto_expand: bool,
}

impl RingBuffer {
    /// Create a buffer of `capacity` bytes.  Pushing past capacity fails
    /// unless `auto_expand` is set.
    pub fn new(capacity: usize, auto_expand: bool) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: vec![0; capacity],
            offset: 0,
            count: 0,
            initial_capacity: capacity,
            auto_expand,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of valid bytes stored.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Offset of the first valid byte in storage.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.count
    }

    fn end(&self) -> usize {
        (self.offset + self.count) % self.capacity()
    }

    /// Append `chunk` to the buffer.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), BufferError> {
        let required = self.count + chunk.len();
        if required > self.capacity() {
            if !self.auto_expand {
                return Err(BufferError::InsufficientSpace {
                    requested: chunk.len(),
                    free: self.free(),
                });
            }
            self.grow(required);
        }

        let end = self.end();
        let first = chunk.len().min(self.capacity() - end);
        self.storage[end..end + first].copy_from_slice(&chunk[..first]);
        let rest = chunk.len() - first;
        if rest > 0 {
            self.storage[..rest].copy_from_slice(&chunk[first..]);
        }

        self.count += chunk.len();
        Ok(())
    }

    fn grow(&mut self, required: usize) {
        let mut new_capacity = self.capacity() * 2;
        while new_capacity < required {
            new_capacity *= 2;
        }

        let mut storage = vec![0; new_capacity];
        self.copy_out(&mut storage[..self.count]);

        log::debug!(
            "STREAM: ring buffer grew {} -> {} bytes",
            self.capacity(),
            new_capacity
        );
        self.storage = storage;
        self.offset = 0;
    }

    /// Copy the first `out.len()` valid bytes into `out`.
    fn copy_out(&self, out: &mut [u8]) {
        let first = out.len().min(self.capacity() - self.offset);
        out[..first].copy_from_slice(&self.storage[self.offset..self.offset + first]);
        let rest = out.len() - first;
        if rest > 0 {
            out[first..].copy_from_slice(&self.storage[..rest]);
        }
    }

    fn check(&self, length: usize) -> Result<(), BufferError> {
        if self.count < length {
            return Err(BufferError::Underflow {
                requested: length,
                available: self.count,
            });
        }
        Ok(())
    }

    /// Copy the next `length` bytes without consuming them.
    pub fn peek(&self, length: usize) -> Result<Vec<u8>, BufferError> {
        self.check(length)?;
        let mut out = vec![0; length];
        self.copy_out(&mut out);
        Ok(out)
    }

    /// Remove and return the next `length` bytes.
    pub fn pop(&mut self, length: usize) -> Result<Vec<u8>, BufferError> {
        let out = self.peek(length)?;
        self.offset = (self.offset + length) % self.capacity();
        self.count -= length;
        Ok(out)
    }

    /// Peek a structure described by an integer-only `pack` format.
    pub fn peek_as(&self, fmt: &str) -> Result<Vec<i64>, BufferError> {
        let bytes = self.peek(pack::expected_size(fmt)?)?;
        Ok(pack::unpack_ints(fmt, &bytes)?)
    }

    /// Pop a structure described by an integer-only `pack` format.
    pub fn pop_as(&mut self, fmt: &str) -> Result<Vec<i64>, BufferError> {
        let length = pack::expected_size(fmt)?;
        // Validate the format before consuming anything.
        let values = pack::unpack_ints(fmt, &self.peek(length)?)?;
        self.pop(length)?;
        Ok(values)
    }

    /// Drop all data and shrink back to the initial capacity.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.count = 0;
        if self.storage.len() != self.initial_capacity {
            self.storage = vec![0; self.initial_capacity];
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
