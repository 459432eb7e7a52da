//! Fixed-capacity FIFO history.

use kz_core::{Reading, TimestampNs};
use std::collections::VecDeque;

/// Items that carry a sensor-clock timestamp.
pub trait Timestamped {
    fn timestamp_ns(&self) -> TimestampNs;
}

impl Timestamped for Reading {
    fn timestamp_ns(&self) -> TimestampNs {
        self.timestamp_ns
    }
}

/// Bounded history; pushing into a full buffer evicts the oldest entry.
///
/// Insertion order is temporal order. The buffer does no locking of its own;
/// owners that share it across threads wrap it (see
/// [`WindowAssembler`](crate::WindowAssembler)).
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize
}

impl<T> RingBuffer<T> {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity
        }
    }

    /// Appends `item`, returning the evicted entry if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Timestamped + Clone> RingBuffer<T> {
    /// All retained entries with `timestamp >= since`, oldest first.
    pub fn snapshot_since(&self, since: TimestampNs) -> Vec<T> {
        self.items
            .iter()
            .filter(|item| item.timestamp_ns() >= since)
            .cloned()
            .collect()
    }

    pub fn latest_timestamp(&self) -> Option<TimestampNs> {
        self.items.back().map(Timestamped::timestamp_ns)
    }
}
