//! Memory Backend Module
//!
//! Bounded in-process tier combining HashMap storage with FIFO eviction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{Backend, BackendKind, Entry, FifoTracker};
use crate::error::Result;

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, Entry>,
    order: FifoTracker,
}

// == Memory Backend ==
/// Bounded in-memory storage with FIFO eviction.
///
/// When full, the earliest inserted entry is evicted no matter how recently it
/// was read. Reads never change eviction order.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    /// Maximum number of entries allowed
    max_entries: usize,
    evictions: AtomicU64,
}

impl MemoryBackend {
    // == Constructor ==
    /// Creates a memory tier holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            max_entries,
            evictions: AtomicU64::new(0),
        }
    }

    /// Non-async lookup; the memory tier never suspends.
    pub fn get_entry(&self, key: &str) -> Option<Entry> {
        self.state.lock().entries.get(key).cloned()
    }

    // == Insert ==
    /// Stores an entry, evicting the oldest insertion if the tier is full.
    ///
    /// Overwriting an existing key never evicts and re-queues the key as newest.
    /// Returns false when the tier has no capacity and nothing was stored.
    pub fn insert(&self, key: &str, entry: Entry) -> bool {
        if self.max_entries == 0 {
            return false;
        }

        let mut state = self.state.lock();
        let is_overwrite = state.entries.contains_key(key);

        if !is_overwrite && state.entries.len() >= self.max_entries {
            if let Some(evicted_key) = state.order.evict_oldest() {
                state.entries.remove(&evicted_key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %evicted_key, "memory tier evicted oldest entry");
            }
        }

        state.entries.insert(key.to_string(), entry);
        state.order.insert(key);
        true
    }

    // == Delete ==
    /// Removes an entry, returning whether one was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.entries.remove(key).is_some();
        if removed {
            state.order.remove(key);
        }
        removed
    }

    /// Removes every entry under `prefix`.
    pub fn clear_prefix(&self, prefix: &str) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|k, _| !k.starts_with(prefix));
        state.order.retain(|k| !k.starts_with(prefix));
        before - state.entries.len()
    }

    // == Cleanup Expired ==
    /// Removes expired entries under `prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self, prefix: &str, now: u64) -> usize {
        let mut state = self.state.lock();
        let expired_keys: Vec<String> = state
            .entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            state.entries.remove(key);
            state.order.remove(key);
        }

        expired_keys.len()
    }

    /// Drops everything regardless of namespace.
    pub fn purge(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        Ok(self.get_entry(key))
    }

    async fn set(&self, key: &str, entry: Entry) -> Result<()> {
        self.insert(key, entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.delete(key);
        Ok(())
    }

    async fn clear(&self, prefix: &str) -> Result<usize> {
        Ok(self.clear_prefix(prefix))
    }

    async fn sweep_expired(&self, prefix: &str, now: u64) -> Result<usize> {
        Ok(self.cleanup_expired(prefix, now))
    }
}
