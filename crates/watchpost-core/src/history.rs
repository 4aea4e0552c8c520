//! Bounded history of published results

use crate::types::AlarmSummary;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// FIFO of the most recent results, oldest first
#[derive(Debug)]
pub struct ResultHistory {
    entries: Mutex<VecDeque<AlarmSummary>>,
    capacity: usize,
}

impl ResultHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<AlarmSummary>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append in completion order, evicting the oldest entry when full
    pub fn push(&self, summary: AlarmSummary) {
        let mut entries = self.entries();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(summary);
    }

    pub fn snapshot(&self) -> Vec<AlarmSummary> {
        self.entries().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<AlarmSummary> {
        self.entries().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ResultHistory {
    fn default() -> Self {
        Self::new(100)
    }
}
