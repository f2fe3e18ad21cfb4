//! Chunk sequence tracking for AirPipe.
//!
//! Chunks carry a sequence number starting at 0 that must arrive strictly in
//! order with no gaps. The relay forwards frames over a single ordered
//! connection, so any gap or reordering means frames were dropped, replayed
//! or injected, and the transfer is abandoned.

use thiserror::Error;

/// A chunk arrived out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sequence gap: expected chunk {expected}, got {actual}")]
pub struct SequenceGap {
    /// The sequence number that should have arrived.
    pub expected: u64,
    /// The sequence number that did arrive.
    pub actual: u64,
}

/// Tracks the next expected chunk sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    next: u64,
}

impl SequenceTracker {
    /// Create a tracker expecting chunk 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `sequence` is the next expected number.
    ///
    /// Does not advance; call [`SequenceTracker::advance`] once the chunk has
    /// been authenticated.
    pub fn check(&self, sequence: u64) -> Result<(), SequenceGap> {
        if sequence == self.next {
            Ok(())
        } else {
            Err(SequenceGap {
                expected: self.next,
                actual: sequence,
            })
        }
    }

    /// Mark the expected chunk as accepted.
    pub fn advance(&mut self) {
        self.next += 1;
    }

    /// Sequence number of the next expected chunk (equals chunks accepted so far).
    pub fn next_expected(&self) -> u64 {
        self.next
    }
}

/// Number of chunks needed to carry `size` bytes at `chunk_size` bytes each.
///
/// An empty file is sent as zero chunks.
pub fn chunk_count(size: u64, chunk_size: usize) -> u64 {
    let chunk = chunk_size.max(1) as u64;
    size.div_ceil(chunk)
}
