//! Quarantine for readings that keep failing.
//!
//! A skipped reading stays unscored and comes back on the next fetch. Once it
//! has been skipped `max_attempts` times it is excluded from fetches, so a run
//! of bad rows at the head of the queue cannot starve the readings behind it.
//! The store is left untouched.
//!
//! Both tables are bounded: attempt counts are kept only for readings seen in
//! the latest batch, and past `capacity` the oldest quarantined id is released
//! and goes through the attempt cycle again.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::ReadingId;

/// Quarantined ids kept before the oldest is released
pub const DEFAULT_CAPACITY: usize = 1_000;

#[derive(Debug, Default)]
pub struct Quarantine {
    /// 0 disables quarantine
    max_attempts: u32,
    capacity: usize,
    attempts: HashMap<ReadingId, u32>,
    quarantined: BTreeSet<ReadingId>,
}

impl Quarantine {
    pub fn new(max_attempts: u32) -> Self {
        Self::with_capacity(max_attempts, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(max_attempts: u32, capacity: usize) -> Self {
        Self {
            max_attempts,
            capacity: capacity.max(1),
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Count a skip. Returns true when this skip quarantines the reading.
    pub fn record_skip(&mut self, id: ReadingId) -> bool {
        if !self.is_enabled() || self.contains(id) {
            return false;
        }

        let attempts = self.attempts.entry(id).or_insert(0);
        *attempts += 1;
        if *attempts < self.max_attempts {
            return false;
        }

        self.attempts.remove(&id);
        if self.quarantined.len() >= self.capacity {
            if let Some(released) = self.quarantined.pop_first() {
                tracing::debug!(reading_id = released, "Quarantine full, releasing oldest reading");
            }
        }
        self.quarantined.insert(id)
    }

    /// Drop the attempt history of a reading that has been scored
    pub fn forget(&mut self, id: ReadingId) {
        self.attempts.remove(&id);
    }

    /// Keep attempt counts only for readings in `fetched`. A reading that
    /// stopped coming back was scored or removed elsewhere.
    pub fn retain_attempts(&mut self, fetched: &[ReadingId]) {
        let fetched: HashSet<ReadingId> = fetched.iter().copied().collect();
        self.attempts.retain(|id, _| fetched.contains(id));
    }

    pub fn attempts(&self, id: ReadingId) -> u32 {
        self.attempts.get(&id).copied().unwrap_or(0)
    }

    pub fn contains(&self, id: ReadingId) -> bool {
        self.quarantined.contains(&id)
    }

    /// Ids to exclude from the next fetch, ascending
    pub fn excluded(&self) -> Vec<ReadingId> {
        self.quarantined.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.quarantined.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarantines_after_max_attempts() {
        let mut q = Quarantine::new(3);
        assert!(!q.record_skip(8));
        assert!(!q.record_skip(8));
        assert_eq!(q.attempts(8), 2);
        assert!(q.record_skip(8));
        assert!(q.contains(8));
        assert_eq!(q.excluded(), vec![8]);
        // Already quarantined
        assert!(!q.record_skip(8));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_disabled_never_quarantines() {
        let mut q = Quarantine::new(0);
        for _ in 0..100 {
            assert!(!q.record_skip(1));
        }
        assert!(q.excluded().is_empty());
        assert_eq!(q.attempts(1), 0);
    }

    #[test]
    fn test_forget_resets_attempts() {
        let mut q = Quarantine::new(2);
        q.record_skip(5);
        q.forget(5);
        assert_eq!(q.attempts(5), 0);
        assert!(!q.record_skip(5));
    }

    #[test]
    fn test_excluded_is_sorted() {
        let mut q = Quarantine::new(1);
        q.record_skip(30);
        q.record_skip(10);
        q.record_skip(20);
        assert_eq!(q.excluded(), vec![10, 20, 30]);
    }

    #[test]
    fn test_capacity_releases_oldest() {
        let mut q = Quarantine::with_capacity(1, 2);
        assert!(q.record_skip(10));
        assert!(q.record_skip(20));
        assert!(q.record_skip(30));
        assert_eq!(q.len(), 2);
        assert_eq!(q.excluded(), vec![20, 30]);
        assert!(!q.contains(10));
    }

    #[test]
    fn test_retain_attempts_drops_readings_not_refetched() {
        let mut q = Quarantine::new(5);
        q.record_skip(1);
        q.record_skip(2);
        q.retain_attempts(&[2, 3]);
        assert_eq!(q.attempts(1), 0);
        assert_eq!(q.attempts(2), 1);
    }
}
