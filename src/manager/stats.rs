//! Cache Statistics Module
//!
//! Tracks reads, writes, hits and misses for a manager.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of `get` calls
    pub reads: u64,
    /// Number of `set` calls that reached the memory tier
    pub writes: u64,
    /// Reads answered with a live value from any tier
    pub hits: u64,
    /// Reads that found no live value
    pub misses: u64,
    /// Entries pushed out of the memory tier by FIFO eviction
    pub evictions: u64,
    /// Current number of entries in the memory tier
    pub memory_entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates hits / reads, or 0.0 if nothing has been read.
    pub fn hit_rate(&self) -> f64 {
        if self.reads == 0 {
            0.0
        } else {
            self.hits as f64 / self.reads as f64
        }
    }
}

// == Stats Collector ==
/// Lock-free monotonic counters shared by concurrent callers.
#[derive(Debug, Default)]
pub struct StatsCollector {
    reads: AtomicU64,
    writes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot with the memory tier figures filled in by the caller.
    pub fn snapshot(&self, evictions: u64, memory_entries: usize) -> CacheStats {
        CacheStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions,
            memory_entries,
        }
    }
}
