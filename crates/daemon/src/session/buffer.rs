//! Output accumulator shared by a session's reader and its callers.
//!
//! The reader thread appends, handler calls drain. Both go through the same
//! mutex so a drain never observes half of an append and no byte is handed
//! out twice.

use std::sync::{Mutex, MutexGuard};

/// Byte accumulator with atomic read-and-clear.
///
/// With a non-zero capacity the buffer keeps only the most recent
/// `capacity` bytes; older bytes are discarded and counted.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Inner {
    data: Vec<u8>,
    dropped: u64,
}

impl OutputBuffer {
    /// Creates an unbounded buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer holding at most `capacity` bytes between drains.
    /// A capacity of zero means unbounded.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    /// Returns the configured capacity (zero when unbounded).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock cannot leave `Inner` half-written in a
    // way that matters to callers, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends bytes, discarding the oldest ones if the cap is exceeded.
    ///
    /// Returns the number of bytes discarded by this call.
    pub fn append(&self, bytes: &[u8]) -> usize {
        let mut inner = self.lock();
        inner.data.extend_from_slice(bytes);

        if self.capacity == 0 || inner.data.len() <= self.capacity {
            return 0;
        }

        let overflow = inner.data.len() - self.capacity;
        inner.data.drain(..overflow);
        inner.dropped += overflow as u64;
        overflow
    }

    /// Returns everything accumulated so far and empties the buffer.
    pub fn read_and_clear(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().data)
    }

    /// Number of bytes currently held.
    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes discarded because of the cap since creation.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
