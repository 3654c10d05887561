//! Transactional Backend Module
//!
//! Asynchronous store applying batches of operations atomically. Keeps an
//! index of entries by expiry so sweeps are range queries instead of scans.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Backend, BackendKind, Entry};
use crate::error::{CacheError, Result};

// == Transaction Operation ==
/// A single step inside a transaction.
#[derive(Debug, Clone)]
pub enum TxOp {
    Put { key: String, entry: Entry },
    Delete { key: String },
}

#[derive(Debug, Default, Clone)]
struct TxState {
    records: HashMap<String, Entry>,
    by_expiry: BTreeMap<u64, BTreeSet<String>>,
}

impl TxState {
    fn from_records(records: HashMap<String, Entry>) -> Self {
        let mut state = Self::default();
        for (key, entry) in records {
            state.put(key, entry);
        }
        state
    }

    fn put(&mut self, key: String, entry: Entry) {
        self.delete(&key);
        if let Some(at) = entry.expires_at {
            self.by_expiry.entry(at).or_default().insert(key.clone());
        }
        self.records.insert(key, entry);
    }

    fn delete(&mut self, key: &str) -> bool {
        let Some(old) = self.records.remove(key) else {
            return false;
        };
        if let Some(at) = old.expires_at {
            if let Some(keys) = self.by_expiry.get_mut(&at) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_expiry.remove(&at);
                }
            }
        }
        true
    }

    fn apply(&mut self, op: TxOp) {
        match op {
            TxOp::Put { key, entry } => self.put(key, entry),
            TxOp::Delete { key } => {
                self.delete(&key);
            }
        }
    }
}

// == Transactional Backend ==
/// Async store with multi-record transactions and an expiry index.
#[derive(Debug)]
pub struct TransactionalBackend {
    /// Snapshot file; None = volatile
    path: Option<PathBuf>,
    state: RwLock<TxState>,
}

impl Default for TransactionalBackend {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl TransactionalBackend {
    // == Constructors ==
    /// Creates a store without durable storage.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(TxState::default()),
        }
    }

    /// Opens a store backed by the snapshot file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records: HashMap<String, Entry> = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                CacheError::unavailable(BackendKind::Transactional, format!("parse {:?}: {}", path, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(CacheError::unavailable(
                    BackendKind::Transactional,
                    format!("read {:?}: {}", path, e),
                ))
            }
        };

        info!(entries = records.len(), path = ?path, "opened transactional store");

        Ok(Self {
            path: Some(path),
            state: RwLock::new(TxState::from_records(records)),
        })
    }

    // == Transaction ==
    /// Applies `ops` in order as one unit.
    ///
    /// Either every operation is visible afterwards or, if the snapshot cannot
    /// be written, none is.
    pub async fn transaction(&self, ops: Vec<TxOp>) -> Result<()> {
        let mut state = self.state.write().await;
        self.commit(&mut state, |state| {
            for op in ops {
                state.apply(op);
            }
        })
        .await
    }

    /// Deletes `keys` under the caller's write guard. Nothing is persisted
    /// when the list is empty.
    async fn delete_all(&self, state: &mut TxState, keys: Vec<String>) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = keys.len();
        self.commit(state, |state| {
            for key in &keys {
                state.delete(key);
            }
        })
        .await?;
        Ok(removed)
    }

    /// Runs `mutate` then writes the snapshot, restoring the previous state if
    /// the write fails.
    async fn commit(&self, state: &mut TxState, mutate: impl FnOnce(&mut TxState)) -> Result<()> {
        let before = self.path.as_ref().map(|_| state.clone());
        mutate(state);
        if let Err(e) = self.persist(state).await {
            if let Some(before) = before {
                *state = before;
            }
            return Err(e);
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, state: &TxState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_vec(&state.records)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        let written = async {
            tokio::fs::write(&tmp, raw).await?;
            tokio::fs::rename(&tmp, path).await
        };
        written.await.map_err(|e| {
            CacheError::unavailable(BackendKind::Transactional, format!("write {:?}: {}", path, e))
        })
    }
}

#[async_trait]
impl Backend for TransactionalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Transactional
    }

    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        Ok(self.state.read().await.records.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: Entry) -> Result<()> {
        self.transaction(vec![TxOp::Put {
            key: key.to_string(),
            entry,
        }])
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if !self.state.read().await.records.contains_key(key) {
            return Ok(());
        }
        self.transaction(vec![TxOp::Delete {
            key: key.to_string(),
        }])
        .await
    }

    async fn clear(&self, prefix: &str) -> Result<usize> {
        // selection and deletion share one write guard so a concurrent set
        // lands either wholly before or wholly after the clear
        let mut state = self.state.write().await;
        let keys: Vec<String> = state
            .records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        self.delete_all(&mut state, keys).await
    }

    async fn sweep_expired(&self, prefix: &str, now: u64) -> Result<usize> {
        let mut state = self.state.write().await;
        let keys: Vec<String> = state
            .by_expiry
            .range(..=now)
            .flat_map(|(_, keys)| keys.iter())
            .filter(|k| k.starts_with(prefix))
            .filter(|k| state.records.get(*k).is_some_and(|e| e.is_expired_at(now)))
            .cloned()
            .collect();
        let removed = self.delete_all(&mut state, keys).await?;
        if removed > 0 {
            debug!(prefix, removed, "swept expired range");
        }
        Ok(removed)
    }
}
