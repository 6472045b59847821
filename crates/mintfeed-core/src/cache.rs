//! Fixed-capacity FIFO replay buffer of recently broadcast events.
//!
//! The cache is not synchronized. The hub owns it inside its state lock so a
//! push and the fan-out that follows it are never observed separately.

use std::collections::VecDeque;

use crate::types::EnrichedEvent;

pub const DEFAULT_CACHE_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct EventCache {
    entries: VecDeque<EnrichedEvent>,
    capacity: usize,
}

impl EventCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }

    /// Append `event`, evicting the oldest entry when full.
    pub fn push(&mut self, event: EnrichedEvent) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    /// Current contents, oldest first.
    pub fn snapshot(&self) -> Vec<EnrichedEvent> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnrichedEvent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
