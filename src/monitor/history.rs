//! Bounded result history for one target.

use std::collections::VecDeque;

use parking_lot::RwLock;

use crate::probe::CheckResult;

/// Thread-safe, fixed-capacity history of check results, oldest first.
///
/// One writer (the target's check loop) appends; any number of readers take
/// snapshots. Once full, every append evicts the oldest result.
#[derive(Debug)]
pub struct ResultHistory {
    capacity: usize,
    results: RwLock<VecDeque<CheckResult>>,
}

impl ResultHistory {
    /// Create an empty history. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            results: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&self, result: CheckResult) {
        let mut results = self.results.write();
        results.push_back(result);
        while results.len() > self.capacity {
            results.pop_front();
        }
    }

    /// Copy of every retained result, oldest first.
    pub fn snapshot(&self) -> Vec<CheckResult> {
        self.results.read().iter().cloned().collect()
    }

    /// Most recent result, or the zero-value result when empty.
    pub fn latest(&self) -> CheckResult {
        self.results.read().back().cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
    }
}
