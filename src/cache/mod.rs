//! Bounded "have I seen this recently" caches
//!
//! A `RecencyCache` is a fixed-capacity set with FIFO eviction. It is used for
//! URI deduplication at intake and for target-IP anti-clustering at validation.
//! Both uses are approximate: anything pushed out of the window is forgotten.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Fixed-capacity set that forgets its oldest insertions first
#[derive(Debug, Clone)]
pub struct RecencyCache<K> {
    members: HashSet<K>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K> RecencyCache<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty cache; a capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            members: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts a key, returning `true` if it was not already present
    ///
    /// Re-inserting a present key does not refresh its position.
    pub fn insert(&mut self, key: K) -> bool {
        if self.members.contains(&key) {
            return false;
        }

        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }

        self.order.push_back(key.clone());
        self.members.insert(key);
        true
    }

    /// Returns true if the key is inside the window
    pub fn contains(&self, key: &K) -> bool {
        self.members.contains(key)
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when nothing is held
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum number of keys held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forgets everything
    pub fn clear(&mut self) {
        self.members.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_novelty() {
        let mut cache = RecencyCache::new(4);
        assert!(cache.insert("a"));
        assert!(!cache.insert("a"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_keeps_most_recent_capacity() {
        let capacity = 5;
        let total = 12;
        let mut cache = RecencyCache::new(capacity);
        for i in 0..total {
            cache.insert(format!("https://example.com/{}", i));
        }

        assert_eq!(cache.len(), capacity);
        for i in 0..total {
            let key = format!("https://example.com/{}", i);
            assert_eq!(cache.contains(&key), i >= total - capacity, "key {}", i);
        }
    }

    #[test]
    fn test_reinsert_does_not_refresh() {
        let mut cache = RecencyCache::new(2);
        cache.insert(1);
        cache.insert(2);
        cache.insert(1);
        cache.insert(3);

        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert!(cache.contains(&3));
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut cache = RecencyCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert('x');
        cache.insert('y');
        assert!(cache.contains(&'y'));
        assert!(!cache.contains(&'x'));
    }

    #[test]
    fn test_clear() {
        let mut cache = RecencyCache::new(3);
        cache.insert(1);
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.contains(&1));
    }
}
