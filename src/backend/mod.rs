//! Backend Module
//!
//! Storage providers behind a single async contract. The manager walks them in
//! priority order and never branches on the concrete type.

mod entry;
mod fifo;
mod memory;
mod sync_kv;
mod transactional;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

pub use entry::Entry;
pub use fifo::FifoTracker;
pub use memory::MemoryBackend;
pub use sync_kv::SyncKvBackend;
pub use transactional::{TransactionalBackend, TxOp};

/// Key used by the capability probe. Never valid as a namespaced key.
pub const PROBE_KEY: &str = "__tiered_cache_probe__";

// == Backend Kind ==
/// Identifies a storage tier.
///
/// Persistent tiers are ordered by read/write priority:
/// `Transactional`, then `LocalKv`, then `SessionKv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Bounded in-process tier
    Memory,
    /// Asynchronous store with multi-record transactions
    Transactional,
    /// Durable synchronous key-value store
    LocalKv,
    /// Volatile synchronous key-value store
    SessionKv,
}

impl BackendKind {
    /// Persistent kinds in cascade order.
    pub const PERSISTENT: [BackendKind; 3] = [
        BackendKind::Transactional,
        BackendKind::LocalKv,
        BackendKind::SessionKv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Transactional => "transactional",
            BackendKind::LocalKv => "local_kv",
            BackendKind::SessionKv => "session_kv",
        }
    }

    /// Cascade position; lower is consulted first.
    pub fn priority(&self) -> u8 {
        match self {
            BackendKind::Memory => 0,
            BackendKind::Transactional => 1,
            BackendKind::LocalKv => 2,
            BackendKind::SessionKv => 3,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(BackendKind::Memory),
            "transactional" => Ok(BackendKind::Transactional),
            "local_kv" | "local" => Ok(BackendKind::LocalKv),
            "session_kv" | "session" => Ok(BackendKind::SessionKv),
            other => Err(CacheError::InvalidKey(format!(
                "unknown backend '{}'",
                other
            ))),
        }
    }
}

// == Backend Trait ==
/// Uniform storage contract.
///
/// Keys are backend-visible (already namespaced). Backends never drop expired
/// entries on `get`; expiry is decided by the caller.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    async fn get(&self, key: &str) -> Result<Option<Entry>>;

    /// Stores `entry`, overwriting any previous value.
    ///
    /// Fails with `QuotaExceeded` or `BackendUnavailable` rather than storing
    /// partially.
    async fn set(&self, key: &str, entry: Entry) -> Result<()>;

    /// Idempotent.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Removes every key starting with `prefix`. Returns how many were removed.
    async fn clear(&self, prefix: &str) -> Result<usize>;

    /// Removes entries under `prefix` with `expires_at <= now`.
    async fn sweep_expired(&self, prefix: &str, now: u64) -> Result<usize>;

    /// One-shot write/delete capability check.
    async fn probe(&self) -> Result<()> {
        self.set(PROBE_KEY, Entry::new(vec![0], 0, None)).await?;
        self.remove(PROBE_KEY).await
    }
}

// == Availability ==
/// Which persistent backends passed the construction-time probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackendAvailability {
    pub available: Vec<BackendKind>,
    pub unavailable: Vec<(BackendKind, String)>,
}

impl BackendAvailability {
    pub fn is_available(&self, kind: BackendKind) -> bool {
        kind == BackendKind::Memory || self.available.contains(&kind)
    }
}
