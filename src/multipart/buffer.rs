//! Scratch buffer for the multipart decoder.
//!
//! A single byte region with a live window `[start, end)`. Consumed bytes
//! advance `start`; `compact` slides the live window back to offset 0 and
//! `extend` doubles capacity when the compacted window still cannot fit the
//! incoming chunk.

const MIN_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct ScratchBuffer {
    storage: Vec<u8>,
    start: usize,
    end: usize,
}

impl ScratchBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity.max(MIN_CAPACITY)],
            start: 0,
            end: 0,
        }
    }

    /// Live bytes not yet consumed.
    pub fn data(&self) -> &[u8] {
        &self.storage[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Append `chunk`, compacting and then growing as needed.
    pub fn extend(&mut self, chunk: &[u8]) {
        if self.end + chunk.len() > self.storage.len() {
            self.compact();
        }
        let needed = self.end + chunk.len();
        if needed > self.storage.len() {
            let mut capacity = self.storage.len().max(MIN_CAPACITY);
            while capacity < needed {
                capacity *= 2;
            }
            self.storage.resize(capacity, 0);
        }
        self.storage[self.end..needed].copy_from_slice(chunk);
        self.end = needed;
    }

    /// Drop `n` bytes from the front of the live window.
    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.end);
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Move the live window to the front of the storage.
    pub fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.storage.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }
}
