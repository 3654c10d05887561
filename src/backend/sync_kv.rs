//! Synchronous Key-Value Backend Module
//!
//! Quota-bounded store that never suspends. Optionally durable through a JSON
//! snapshot file rewritten after every mutation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{Backend, BackendKind, Entry};
use crate::error::{CacheError, Result};

#[derive(Debug, Default, Clone)]
struct KvState {
    entries: HashMap<String, Entry>,
    used_bytes: usize,
}

impl KvState {
    fn footprint(key: &str, entry: &Entry) -> usize {
        key.len() + entry.size_bytes()
    }

    fn from_entries(entries: HashMap<String, Entry>) -> Self {
        let used_bytes = entries.iter().map(|(k, e)| Self::footprint(k, e)).sum();
        Self {
            entries,
            used_bytes,
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(old) => {
                self.used_bytes -= Self::footprint(key, &old);
                true
            }
            None => false,
        }
    }

    fn remove_where(&mut self, mut pred: impl FnMut(&str, &Entry) -> bool) -> usize {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|(k, e)| pred(k, e))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }
}

// == Sync KV Backend ==
/// Synchronous key-value store with a byte quota.
#[derive(Debug)]
pub struct SyncKvBackend {
    kind: BackendKind,
    quota_bytes: usize,
    /// Snapshot file; None = volatile
    path: Option<PathBuf>,
    state: Mutex<KvState>,
}

impl SyncKvBackend {
    // == Constructors ==
    /// Creates a store that lives for the process lifetime only.
    pub fn volatile(kind: BackendKind, quota_bytes: usize) -> Self {
        Self {
            kind,
            quota_bytes,
            path: None,
            state: Mutex::new(KvState::default()),
        }
    }

    /// Opens a durable store backed by the snapshot file at `path`.
    ///
    /// A missing file starts empty; an unreadable one is an error.
    pub fn open(kind: BackendKind, path: impl AsRef<Path>, quota_bytes: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries: HashMap<String, Entry> = if path.exists() {
            let raw = fs::read(&path)
                .map_err(|e| CacheError::unavailable(kind, format!("read {:?}: {}", path, e)))?;
            serde_json::from_slice(&raw)
                .map_err(|e| CacheError::unavailable(kind, format!("parse {:?}: {}", path, e)))?
        } else {
            HashMap::new()
        };

        info!(backend = %kind, entries = entries.len(), path = ?path, "opened key-value store");

        Ok(Self {
            kind,
            quota_bytes,
            path: Some(path),
            state: Mutex::new(KvState::from_entries(entries)),
        })
    }

    /// Bytes currently accounted against the quota.
    pub fn used_bytes(&self) -> usize {
        self.state.lock().used_bytes
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, state: &KvState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_vec(&state.entries)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, raw)
            .and_then(|_| fs::rename(&tmp, path))
            .map_err(|e| CacheError::unavailable(self.kind, format!("write {:?}: {}", path, e)))
    }

    /// Applies `mutate` and persists; the in-memory state is rolled back if the
    /// snapshot cannot be written.
    fn commit<T>(&self, mutate: impl FnOnce(&mut KvState) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        let before = self.path.as_ref().map(|_| state.clone());
        let out = mutate(&mut state)?;
        if let Err(e) = self.persist(&state) {
            if let Some(before) = before {
                *state = before;
            }
            return Err(e);
        }
        Ok(out)
    }

    /// Removes every entry matching `pred`. The snapshot is rewritten only when
    /// something was removed.
    fn commit_removal(&self, mut pred: impl FnMut(&str, &Entry) -> bool) -> Result<usize> {
        let mut state = self.state.lock();
        if !state.entries.iter().any(|(k, e)| pred(k, e)) {
            return Ok(0);
        }
        let before = self.path.as_ref().map(|_| state.clone());
        let removed = state.remove_where(pred);
        if let Err(e) = self.persist(&state) {
            if let Some(before) = before {
                *state = before;
            }
            return Err(e);
        }
        Ok(removed)
    }
}

#[async_trait]
impl Backend for SyncKvBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        Ok(self.state.lock().entries.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: Entry) -> Result<()> {
        let kind = self.kind;
        let quota = self.quota_bytes;
        self.commit(|state| {
            let needed = KvState::footprint(key, &entry);
            let freed = state
                .entries
                .get(key)
                .map(|old| KvState::footprint(key, old))
                .unwrap_or(0);
            let available = quota.saturating_sub(state.used_bytes - freed);
            if needed > available {
                return Err(CacheError::QuotaExceeded {
                    backend: kind,
                    needed,
                    available,
                });
            }
            state.remove(key);
            state.used_bytes += needed;
            state.entries.insert(key.to_string(), entry);
            Ok(())
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if !self.state.lock().entries.contains_key(key) {
            return Ok(());
        }
        self.commit(|state| {
            state.remove(key);
            Ok(())
        })
    }

    async fn clear(&self, prefix: &str) -> Result<usize> {
        let removed = self.commit_removal(|k, _| k.starts_with(prefix))?;
        debug!(backend = %self.kind, prefix, removed, "cleared prefix");
        Ok(removed)
    }

    async fn sweep_expired(&self, prefix: &str, now: u64) -> Result<usize> {
        // linear scan: no expiry index here
        self.commit_removal(|k, e| k.starts_with(prefix) && e.is_expired_at(now))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(len: usize, expires_at: Option<u64>) -> Entry {
        Entry::new(vec![7; len], 0, expires_at)
    }

    #[tokio::test]
    async fn test_kv_set_get_overwrite() {
        let kv = SyncKvBackend::volatile(BackendKind::SessionKv, 10_000);

        kv.set("ns_a", entry(4, None)).await.unwrap();
        kv.set("ns_a", entry(8, None)).await.unwrap();

        assert_eq!(kv.get("ns_a").await.unwrap().unwrap().value.len(), 8);
        assert_eq!(kv.len(), 1);
        assert_eq!(kv.used_bytes(), "ns_a".len() + 8 + 16);
    }

    #[tokio::test]
    async fn test_kv_quota_exceeded_fails_loudly() {
        let kv = SyncKvBackend::volatile(BackendKind::LocalKv, 100);

        kv.set("ns_small", entry(10, None)).await.unwrap();
        let err = kv.set("ns_big", entry(200, None)).await.unwrap_err();

        assert!(matches!(err, CacheError::QuotaExceeded { .. }));
        assert!(kv.get("ns_big").await.unwrap().is_none());
        assert!(kv.get("ns_small").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_kv_overwrite_reuses_quota() {
        let kv = SyncKvBackend::volatile(BackendKind::LocalKv, 60);

        kv.set("k", entry(40, None)).await.unwrap();
        // replacing a 40 byte value with a 40 byte value fits
        kv.set("k", entry(40, None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_kv_remove_idempotent() {
        let kv = SyncKvBackend::volatile(BackendKind::SessionKv, 1_000);
        kv.set("k", entry(1, None)).await.unwrap();
        kv.remove("k").await.unwrap();
        kv.remove("k").await.unwrap();
        assert!(kv.is_empty());
        assert_eq!(kv.used_bytes(), 0);
    }

    #[tokio::test]
    async fn test_kv_clear_and_sweep_scoped_by_prefix() {
        let kv = SyncKvBackend::volatile(BackendKind::SessionKv, 10_000);

        kv.set("a_1", entry(1, Some(100))).await.unwrap();
        kv.set("a_2", entry(1, Some(900))).await.unwrap();
        kv.set("b_1", entry(1, Some(100))).await.unwrap();

        assert_eq!(kv.sweep_expired("a_", 500).await.unwrap(), 1);
        assert!(kv.get("b_1").await.unwrap().is_some());

        assert_eq!(kv.clear("a_").await.unwrap(), 1);
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn test_kv_durable_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");

        {
            let kv = SyncKvBackend::open(BackendKind::LocalKv, &path, 10_000).unwrap();
            kv.set("ns_keep", entry(3, Some(42))).await.unwrap();
            kv.set("ns_drop", entry(3, None)).await.unwrap();
            kv.remove("ns_drop").await.unwrap();
        }

        let kv = SyncKvBackend::open(BackendKind::LocalKv, &path, 10_000).unwrap();
        let stored = kv.get("ns_keep").await.unwrap().unwrap();
        assert_eq!(stored.expires_at, Some(42));
        assert!(kv.get("ns_drop").await.unwrap().is_none());
        assert_eq!(kv.used_bytes(), "ns_keep".len() + 3 + 16);
    }

    #[tokio::test]
    async fn test_kv_sweep_and_clear_without_matches_skip_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let kv = SyncKvBackend::open(BackendKind::LocalKv, &path, 10_000).unwrap();
        kv.set("ns_live", entry(3, None)).await.unwrap();

        fs::remove_file(&path).unwrap();
        assert_eq!(kv.sweep_expired("ns_", 1_000).await.unwrap(), 0);
        assert_eq!(kv.clear("other_").await.unwrap(), 0);
        assert!(!path.exists());

        // a removal that matches still rewrites the snapshot
        assert_eq!(kv.clear("ns_").await.unwrap(), 1);
        assert!(path.exists());
    }

    #[test]
    fn test_kv_open_corrupt_snapshot_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        fs::write(&path, b"not json").unwrap();

        let err = SyncKvBackend::open(BackendKind::LocalKv, &path, 100).unwrap_err();
        assert!(matches!(err, CacheError::BackendUnavailable { .. }));
    }
}
