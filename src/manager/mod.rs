//! Tiered Cache Manager Module
//!
//! Orchestrates the memory tier and the persistent backends:
//! - reads check memory, then cascade through persistent backends in priority
//!   order and refill memory on a hit
//! - writes always land in memory, then in the first persistent backend that
//!   accepts them (or every backend in `ReplicateAll` mode)
//! - removals go everywhere; a backend that misses a removal is retried before
//!   it is read again and on every sweep

mod builder;
mod locks;
mod options;
mod stats;

#[cfg(test)]
mod property_tests;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendAvailability, BackendKind, Entry, MemoryBackend};
use crate::clock::Clock;
use crate::error::{CacheError, Result};
use crate::notify::{ChangeEvent, ChangeNotifier, ChangeOperation, ChangeOrigin};
use crate::pipeline::Pipeline;

pub use builder::ManagerBuilder;
pub use locks::KeyLocks;
pub use options::{
    ClearReport, Expiry, GetOptions, SetOptions, SetOutcome, SweepReport, WriteMode,
};
pub use stats::{CacheStats, StatsCollector};

/// Maximum allowed logical key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

// == Tiered Cache Manager ==
#[derive(Debug)]
pub struct TieredCacheManager {
    namespace: String,
    /// `"{namespace}_"`
    prefix: String,
    memory: MemoryBackend,
    /// Backends that passed the probe, in cascade order
    persistent: Vec<Arc<dyn Backend>>,
    availability: BackendAvailability,
    pipeline: Pipeline,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
    default_expiry: Option<Duration>,
    backend_timeout: Duration,
    write_mode: WriteMode,
    stats: StatsCollector,
    locks: KeyLocks,
    /// Storage keys each backend still owes a removal for
    pending_removals: Mutex<HashMap<BackendKind, HashSet<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TieredCacheManager {
    pub fn builder(namespace: impl Into<String>) -> ManagerBuilder {
        ManagerBuilder::new(namespace)
    }

    // == Accessors ==
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn availability(&self) -> &BackendAvailability {
        &self.availability
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// First available persistent backend in cascade order.
    pub fn most_durable_backend(&self) -> Option<BackendKind> {
        self.persistent.first().map(|b| b.kind())
    }

    /// Backend-visible key for a logical key.
    pub fn storage_key(&self, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("key cannot be empty".into()));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidKey(format!(
                "key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        Ok(format!("{}{}", self.prefix, key))
    }

    // == Set ==
    /// Stores `value` under `key`.
    ///
    /// The memory tier is always written. With `opts.target` only that backend
    /// is written and its failure fails the call; otherwise the cascade
    /// decides (see [`WriteMode`]). A value no persistent backend accepted is
    /// held in memory only and reported through [`SetOutcome::is_persisted`].
    pub async fn set(&self, key: &str, value: &Value, opts: SetOptions) -> Result<SetOutcome> {
        self.set_as(key, value, opts).await
    }

    /// Typed variant of [`set`](Self::set).
    pub async fn set_as<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        opts: SetOptions,
    ) -> Result<SetOutcome> {
        let storage_key = self.storage_key(key)?;
        let bytes = self.pipeline.encode_as(value)?;

        let now = self.clock.now_ms();
        let expires_at = opts.expiry.resolve(now, self.default_expiry);
        let entry = Entry::new(bytes, now, expires_at);

        let _guard = self.locks.lock(&storage_key).await;

        let in_memory = self.memory.insert(&storage_key, entry.clone());
        self.stats.record_write();

        let persisted_to = match opts.target {
            Some(BackendKind::Memory) if !in_memory => {
                return Err(CacheError::AllBackendsFailed(
                    "memory tier has no capacity".to_string(),
                ));
            }
            Some(BackendKind::Memory) => Vec::new(),
            Some(kind) => {
                let written = match self.backend(kind) {
                    Ok(backend) => self.write_to(backend, &storage_key, entry).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    // keep memory from disagreeing with the tier that refused
                    self.memory.delete(&storage_key);
                    warn!(key, backend = %kind, error = %e, "targeted write failed");
                    return Err(e);
                }
                vec![kind]
            }
            None => self.write_cascade(&storage_key, entry, in_memory).await?,
        };

        debug!(key, persisted_to = ?persisted_to, expires_at, "stored value");
        self.publish(Some(key), ChangeOperation::Set, opts.origin);
        Ok(SetOutcome { persisted_to })
    }

    async fn write_cascade(
        &self,
        storage_key: &str,
        entry: Entry,
        in_memory: bool,
    ) -> Result<Vec<BackendKind>> {
        let mut written = Vec::new();
        let mut failures = Vec::new();

        for backend in &self.persistent {
            let kind = backend.kind();
            match self.write_to(backend, storage_key, entry.clone()).await {
                Ok(()) => {
                    written.push(kind);
                    if self.write_mode == WriteMode::FirstAvailable {
                        break;
                    }
                }
                Err(e) => {
                    warn!(key = storage_key, backend = %kind, error = %e, "write failed, trying next backend");
                    // an older copy there must not shadow the new one
                    self.mark_pending(kind, storage_key);
                    failures.push(format!("{}: {}", kind, e));
                }
            }
        }

        if written.is_empty() && !in_memory {
            if failures.is_empty() {
                failures.push("no persistent backend and memory tier has no capacity".to_string());
            }
            return Err(CacheError::AllBackendsFailed(failures.join("; ")));
        }
        if written.is_empty() && !self.persistent.is_empty() {
            warn!(key = storage_key, "no persistent backend accepted the write; held in memory only");
        }

        Ok(written)
    }

    async fn write_to(&self, backend: &Arc<dyn Backend>, storage_key: &str, entry: Entry) -> Result<()> {
        self.bounded(backend.kind(), "set", backend.set(storage_key, entry))
            .await?;
        self.clear_pending(backend.kind(), storage_key);
        Ok(())
    }

    // == Get ==
    /// Returns the live value for `key`, or `opts.default` when none exists.
    ///
    /// Only an invalid key is an error; unavailable backends are skipped.
    pub async fn get(&self, key: &str, opts: GetOptions) -> Result<Option<Value>> {
        let storage_key = self.storage_key(key)?;
        let _guard = self.locks.lock(&storage_key).await;

        self.stats.record_read();
        let now = self.clock.now_ms();

        if let Some(value) = self.read_memory(&storage_key, now) {
            self.stats.record_hit();
            debug!(key, tier = "memory", "cache hit");
            return Ok(Some(value));
        }

        let candidates: Vec<&Arc<dyn Backend>> = match opts.target {
            Some(BackendKind::Memory) => Vec::new(),
            Some(kind) => match self.backend(kind) {
                Ok(backend) => vec![backend],
                Err(e) => {
                    warn!(key, backend = %kind, error = %e, "targeted read skipped");
                    Vec::new()
                }
            },
            None => self.persistent.iter().collect(),
        };

        for backend in candidates {
            if let Some(value) = self.read_backend(backend, &storage_key, now).await {
                self.stats.record_hit();
                debug!(key, tier = %backend.kind(), "cache hit");
                return Ok(Some(value));
            }
        }

        self.stats.record_miss();
        debug!(key, "cache miss");
        Ok(opts.default)
    }

    /// Typed variant of [`get`](Self::get).
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str, opts: GetOptions) -> Result<Option<T>> {
        self.get(key, opts)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn read_memory(&self, storage_key: &str, now: u64) -> Option<Value> {
        let entry = self.memory.get_entry(storage_key)?;
        if entry.is_expired_at(now) {
            self.memory.delete(storage_key);
            return None;
        }
        match self.pipeline.decode(&entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = storage_key, error = %e, "undecodable memory entry dropped");
                self.memory.delete(storage_key);
                None
            }
        }
    }

    async fn read_backend(&self, backend: &Arc<dyn Backend>, storage_key: &str, now: u64) -> Option<Value> {
        let kind = backend.kind();

        if self.is_pending(kind, storage_key) {
            // whatever is there was removed or superseded by an earlier call
            if self
                .bounded(kind, "remove", backend.remove(storage_key))
                .await
                .is_ok()
            {
                self.clear_pending(kind, storage_key);
            }
            return None;
        }

        let entry = match self.bounded(kind, "get", backend.get(storage_key)).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = storage_key, backend = %kind, error = %e, "read failed, trying next backend");
                return None;
            }
        };

        if entry.is_expired_at(now) {
            debug!(key = storage_key, backend = %kind, "lazily evicting expired entry");
            self.discard(backend, storage_key).await;
            return None;
        }

        match self.pipeline.decode(&entry.value) {
            Ok(value) => {
                self.memory.insert(storage_key, entry);
                Some(value)
            }
            Err(e) => {
                warn!(key = storage_key, backend = %kind, error = %e, "undecodable entry deleted");
                self.discard(backend, storage_key).await;
                None
            }
        }
    }

    /// Best-effort delete; a failure is deferred as a pending removal.
    async fn discard(&self, backend: &Arc<dyn Backend>, storage_key: &str) {
        let kind = backend.kind();
        if let Err(e) = self.bounded(kind, "remove", backend.remove(storage_key)).await {
            warn!(key = storage_key, backend = %kind, error = %e, "removal deferred");
            self.mark_pending(kind, storage_key);
        }
    }

    // == Remove ==
    /// Removes `key` from memory and from `target`, or from every persistent
    /// backend when no target is given.
    pub async fn remove(&self, key: &str, target: Option<BackendKind>) -> Result<()> {
        let storage_key = self.storage_key(key)?;
        let _guard = self.locks.lock(&storage_key).await;

        self.memory.delete(&storage_key);

        let targets: Vec<&Arc<dyn Backend>> = match target {
            Some(BackendKind::Memory) => Vec::new(),
            Some(kind) => vec![self.backend(kind)?],
            None => self.persistent.iter().collect(),
        };

        let mut first_error = None;
        for backend in targets {
            let kind = backend.kind();
            match self.bounded(kind, "remove", backend.remove(&storage_key)).await {
                Ok(()) => self.clear_pending(kind, &storage_key),
                Err(e) => {
                    warn!(key, backend = %kind, error = %e, "removal deferred");
                    self.mark_pending(kind, &storage_key);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let (Some(_), Some(e)) = (target, first_error) {
            return Err(e);
        }

        debug!(key, "removed value");
        self.publish(Some(key), ChangeOperation::Remove, ChangeOrigin::Local);
        Ok(())
    }

    // == Clear ==
    /// Removes every key of this namespace from memory and from `target`, or
    /// from every persistent backend. Other namespaces are never touched.
    pub async fn clear(&self, target: Option<BackendKind>) -> Result<ClearReport> {
        let _guards = self.locks.lock_all().await;
        let mut report = ClearReport::default();

        report
            .removed
            .insert(BackendKind::Memory, self.memory.clear_prefix(&self.prefix));

        let targets: Vec<&Arc<dyn Backend>> = match target {
            Some(BackendKind::Memory) => Vec::new(),
            Some(kind) => vec![self.backend(kind)?],
            None => self.persistent.iter().collect(),
        };

        for backend in targets {
            let kind = backend.kind();
            match self.bounded(kind, "clear", backend.clear(&self.prefix)).await {
                Ok(removed) => {
                    report.removed.insert(kind, removed);
                    self.pending_removals.lock().remove(&kind);
                }
                Err(e) => {
                    warn!(namespace = %self.namespace, backend = %kind, error = %e, "clear failed");
                    if target.is_some() {
                        return Err(e);
                    }
                    report.failed.push(kind);
                }
            }
        }

        info!(namespace = %self.namespace, removed = ?report.removed, "cleared namespace");
        self.publish(None, ChangeOperation::Clear, ChangeOrigin::Local);
        Ok(report)
    }

    // == Clear Expired ==
    /// Sweeps expired entries of this namespace from every tier and retries
    /// deferred removals.
    pub async fn clear_expired(&self) -> SweepReport {
        let now = self.clock.now_ms();
        let mut report = SweepReport::default();

        report.removed.insert(
            BackendKind::Memory,
            self.memory.cleanup_expired(&self.prefix, now),
        );

        for backend in &self.persistent {
            let kind = backend.kind();
            match self
                .bounded(kind, "sweep", backend.sweep_expired(&self.prefix, now))
                .await
            {
                Ok(removed) => {
                    report.removed.insert(kind, removed);
                }
                Err(e) => {
                    warn!(backend = %kind, error = %e, "sweep failed");
                    report.failed.push(kind);
                }
            }
        }

        report.pending_retried = self.retry_pending_removals().await;
        report
    }

    async fn retry_pending_removals(&self) -> usize {
        let pending: Vec<(BackendKind, String)> = self
            .pending_removals
            .lock()
            .iter()
            .flat_map(|(kind, keys)| keys.iter().map(move |k| (*kind, k.clone())))
            .collect();

        let mut done = 0;
        for (kind, storage_key) in pending {
            let Ok(backend) = self.backend(kind) else {
                continue;
            };
            let _guard = self.locks.lock(&storage_key).await;
            if !self.is_pending(kind, &storage_key) {
                continue;
            }
            if self
                .bounded(kind, "remove", backend.remove(&storage_key))
                .await
                .is_ok()
            {
                self.clear_pending(kind, &storage_key);
                done += 1;
            }
        }
        done
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.stats
            .snapshot(self.memory.evictions(), self.memory.len())
    }

    // == Lifecycle ==
    /// Ties a background task to this manager's lifetime.
    pub fn register_task(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Cancels background tasks and drops the memory tier. Persistent backends
    /// keep their data.
    pub fn dispose(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        self.memory.purge();
        info!(namespace = %self.namespace, tasks = tasks.len(), "manager disposed");
    }

    // == Internals ==
    fn backend(&self, kind: BackendKind) -> Result<&Arc<dyn Backend>> {
        self.persistent
            .iter()
            .find(|b| b.kind() == kind)
            .ok_or_else(|| {
                let reason = self
                    .availability
                    .unavailable
                    .iter()
                    .find(|(k, _)| *k == kind)
                    .map(|(_, reason)| reason.clone())
                    .unwrap_or_else(|| "not configured".to_string());
                CacheError::unavailable(kind, reason)
            })
    }

    /// Runs a backend call under the per-operation timeout.
    async fn bounded<T>(
        &self,
        kind: BackendKind,
        op: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.backend_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::unavailable(
                kind,
                format!("{} timed out after {:?}", op, self.backend_timeout),
            )),
        }
    }

    fn is_pending(&self, kind: BackendKind, storage_key: &str) -> bool {
        self.pending_removals
            .lock()
            .get(&kind)
            .is_some_and(|keys| keys.contains(storage_key))
    }

    fn mark_pending(&self, kind: BackendKind, storage_key: &str) {
        self.pending_removals
            .lock()
            .entry(kind)
            .or_default()
            .insert(storage_key.to_string());
    }

    fn clear_pending(&self, kind: BackendKind, storage_key: &str) {
        if let Some(keys) = self.pending_removals.lock().get_mut(&kind) {
            keys.remove(storage_key);
        }
    }

    fn publish(&self, key: Option<&str>, operation: ChangeOperation, origin: ChangeOrigin) {
        if let Some(notifier) = &self.notifier {
            notifier.publish(ChangeEvent {
                namespace: self.namespace.clone(),
                key: key.map(str::to_string),
                operation,
                origin,
            });
        }
    }
}

impl Drop for TieredCacheManager {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
