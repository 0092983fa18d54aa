//! Segmented LRU deciding which graph nodes to drop.
//!
//! Keys enter the probationary segment. A second access promotes a key to
//! the protected segment; protected overflow demotes the least recently used
//! protected key back to probationary, and probationary overflow evicts.
//! Keys touched once and never again are the first to go.

use std::hash::Hash;

use lru::LruCache;

pub(crate) struct Slru<K: Hash + Eq> {
    probationary: LruCache<K, ()>,
    protected: LruCache<K, ()>,
    probationary_capacity: usize,
    protected_capacity: usize,
}

impl<K: Hash + Eq + Clone> Slru<K> {
    /// Split `capacity` between the segments. The probationary segment always
    /// keeps at least one slot.
    pub(crate) fn new(capacity: usize, protected_ratio: f64) -> Self {
        let capacity = capacity.max(1);
        let protected_capacity =
            ((capacity as f64 * protected_ratio).round() as usize).min(capacity - 1);
        Self {
            probationary: LruCache::unbounded(),
            protected: LruCache::unbounded(),
            probationary_capacity: capacity - protected_capacity,
            protected_capacity,
        }
    }

    /// Record an access and return the keys that fell out of the cache.
    pub(crate) fn touch(&mut self, key: K) -> Vec<K> {
        if self.protected.get(&key).is_some() {
            return Vec::new();
        }
        if self.probationary.pop(&key).is_some() {
            self.protected.put(key, ());
            while self.protected.len() > self.protected_capacity {
                match self.protected.pop_lru() {
                    Some((demoted, ())) => {
                        self.probationary.put(demoted, ());
                    }
                    None => break,
                }
            }
        } else {
            self.probationary.put(key, ());
        }

        let mut evicted = Vec::new();
        while self.probationary.len() > self.probationary_capacity {
            match self.probationary.pop_lru() {
                Some((key, ())) => evicted.push(key),
                None => break,
            }
        }
        evicted
    }

    pub(crate) fn remove(&mut self, key: &K) -> bool {
        self.probationary.pop(key).is_some() || self.protected.pop(key).is_some()
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.probationary.contains(key) || self.protected.contains(key)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.probationary.len() + self.protected.len()
    }
}
