//! Bounded undo history of full-resolution mask snapshots

use super::codec::BinaryMask;
use crate::config::DEFAULT_HISTORY_CAPACITY;
use std::collections::VecDeque;

/// FIFO-evicting stack of mask snapshots
#[derive(Debug, Clone)]
pub struct MaskHistory {
    snapshots: VecDeque<BinaryMask>,
    capacity: usize,
}

impl Default for MaskHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl MaskHistory {
    /// History holding at most `capacity` snapshots (minimum one)
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a snapshot, evicting the oldest when full
    ///
    /// Returns `true` if a snapshot was evicted.
    pub fn push(&mut self, snapshot: BinaryMask) -> bool {
        let evicted = self.snapshots.len() == self.capacity;
        if evicted {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
        evicted
    }

    /// Pop the most recent snapshot
    pub fn pop(&mut self) -> Option<BinaryMask> {
        self.snapshots.pop_back()
    }

    /// Most recent snapshot without removing it
    #[must_use]
    pub fn peek(&self) -> Option<&BinaryMask> {
        self.snapshots.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
