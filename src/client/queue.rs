//! Arrived audio chunks waiting for playback.

use std::collections::BTreeMap;

/// One received chunk, decoded from its transport encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedChunk {
    pub index: usize,
    pub audio: Vec<u8>,
    pub mime_type: String,
    pub duration_seconds: f64,
    pub word_count: usize,
}

/// Chunks keyed by index and released strictly in index order from 0.
///
/// A chunk that arrives early waits until every lower index has been released,
/// so transport reordering can never change playback order.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    pending: BTreeMap<usize, QueuedChunk>,
    next_index: usize, // Next index to release
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk. Returns `false` for duplicates and already played indices.
    pub fn push(&mut self, chunk: QueuedChunk) -> bool {
        if chunk.index < self.next_index || self.pending.contains_key(&chunk.index) {
            return false;
        }
        self.pending.insert(chunk.index, chunk);
        true
    }

    /// Whether the next chunk in order has arrived.
    pub fn is_ready(&self) -> bool {
        self.pending.contains_key(&self.next_index)
    }

    /// Release the next chunk in order, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<QueuedChunk> {
        let chunk = self.pending.remove(&self.next_index)?;
        self.next_index += 1;
        Some(chunk)
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop everything and expect index 0 next.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.next_index = 0;
    }
}
