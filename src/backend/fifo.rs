//! FIFO Tracker Module
//!
//! Tracks insertion order for the memory tier's eviction strategy.

use std::collections::VecDeque;

// == FIFO Tracker ==
/// Tracks insertion order for FIFO eviction.
///
/// Keys are stored in a VecDeque where:
/// - Front = Oldest insertion
/// - Back = Newest insertion
///
/// Reads never reorder keys. Re-inserting an existing key moves it to the back.
#[derive(Debug, Default)]
pub struct FifoTracker {
    /// Order of keys by insertion time
    order: VecDeque<String>,
}

impl FifoTracker {
    // == Constructor ==
    /// Creates a new empty tracker.
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Insert ==
    /// Records `key` as the newest insertion.
    pub fn insert(&mut self, key: &str) {
        self.remove(key);
        self.order.push_back(key.to_string());
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    /// Keeps only keys matching the predicate.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.order.retain(|k| keep(k));
    }

    // == Evict Oldest ==
    /// Returns and removes the earliest inserted key.
    ///
    /// Returns None if tracker is empty.
    pub fn evict_oldest(&mut self) -> Option<String> {
        self.order.pop_front()
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_new() {
        let fifo = FifoTracker::new();
        assert!(fifo.is_empty());
        assert_eq!(fifo.len(), 0);
    }

    #[test]
    fn test_fifo_insert_order() {
        let mut fifo = FifoTracker::new();

        fifo.insert("key1");
        fifo.insert("key2");
        fifo.insert("key3");

        assert_eq!(fifo.len(), 3);
        assert_eq!(fifo.evict_oldest(), Some("key1".to_string()));
        assert_eq!(fifo.len(), 2);
    }

    #[test]
    fn test_fifo_reinsert_moves_to_back() {
        let mut fifo = FifoTracker::new();

        fifo.insert("key1");
        fifo.insert("key2");
        fifo.insert("key1");

        assert_eq!(fifo.len(), 2);
        assert_eq!(fifo.evict_oldest(), Some("key2".to_string()));
        assert_eq!(fifo.evict_oldest(), Some("key1".to_string()));
    }

    #[test]
    fn test_fifo_evict_empty() {
        let mut fifo = FifoTracker::new();
        assert_eq!(fifo.evict_oldest(), None);
    }

    #[test]
    fn test_fifo_remove_and_retain() {
        let mut fifo = FifoTracker::new();

        fifo.insert("a_1");
        fifo.insert("b_1");
        fifo.insert("a_2");

        fifo.remove("nonexistent");
        assert_eq!(fifo.len(), 3);

        fifo.retain(|k| !k.starts_with("a_"));
        assert_eq!(fifo.len(), 1);
        assert_eq!(fifo.evict_oldest(), Some("b_1".to_string()));
    }
}
