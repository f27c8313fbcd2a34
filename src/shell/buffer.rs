//! Bounded buffer for shell output nobody has read yet.
//!
//! The reader task appends everything the shell prints, including output of
//! a command that keeps printing after its wait ended (`yes`, `tail -f`).
//! Past the limit the oldest bytes are dropped. The newest bytes are the
//! ones kept, since the prompt sentinel arrives last.

use std::collections::VecDeque;

/// Output buffer holding at most `limit` bytes.
#[derive(Debug)]
pub struct OutputBuffer {
    bytes: VecDeque<u8>,
    limit: usize,
    /// Bytes dropped since the last `take`
    dropped: usize,
}

impl OutputBuffer {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            bytes: VecDeque::with_capacity(limit.min(4096)),
            limit,
            dropped: 0,
        }
    }

    /// Append `data`, dropping the oldest bytes beyond the limit.
    pub fn extend(&mut self, data: &[u8]) {
        // Only the last `limit` bytes of an oversized chunk can survive
        let data = if data.len() > self.limit {
            self.dropped += data.len() - self.limit;
            &data[data.len() - self.limit..]
        } else {
            data
        };

        self.bytes.extend(data);
        let excess = self.bytes.len().saturating_sub(self.limit);
        if excess > 0 {
            self.bytes.drain(..excess);
            self.dropped += excess;
        }
    }

    /// Take the buffered bytes and the count of bytes dropped before them.
    pub fn take(&mut self) -> (Vec<u8>, usize) {
        let bytes = Vec::from(std::mem::take(&mut self.bytes));
        let dropped = std::mem::take(&mut self.dropped);
        (bytes, dropped)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
