//! Manager construction and capability probing.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use super::{KeyLocks, StatsCollector, TieredCacheManager, WriteMode};
use crate::backend::{
    Backend, BackendAvailability, BackendKind, MemoryBackend, SyncKvBackend, TransactionalBackend,
};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::notify::ChangeNotifier;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Default number of entries held by the memory tier
pub const DEFAULT_MEMORY_CAPACITY: usize = 100;

/// Default bound on a single backend call
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(2);

// == Manager Builder ==
#[derive(Debug)]
pub struct ManagerBuilder {
    namespace: String,
    memory_capacity: usize,
    default_expiry: Option<Duration>,
    pipeline: PipelineConfig,
    backends: Vec<Arc<dyn Backend>>,
    /// Backends that could not even be opened
    unopened: Vec<(BackendKind, String)>,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
    backend_timeout: Duration,
    write_mode: WriteMode,
}

impl ManagerBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            default_expiry: None,
            pipeline: PipelineConfig::plain(),
            backends: Vec::new(),
            unopened: Vec::new(),
            clock: Arc::new(SystemClock),
            notifier: None,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            write_mode: WriteMode::default(),
        }
    }

    /// Builder preloaded from configuration with the standard backends:
    /// a durable transactional store and durable local store under
    /// `config.data_dir`, plus a volatile session store.
    pub async fn from_config(config: &Config) -> Self {
        let mut builder = Self::new(config.namespace.clone())
            .memory_capacity(config.memory_max_entries)
            .default_expiry(config.default_expiry_ms.map(Duration::from_millis))
            .pipeline(config.pipeline_config())
            .backend_timeout(Duration::from_millis(config.backend_timeout_ms))
            .write_mode(config.write_mode);

        let data_dir = Path::new(&config.data_dir);
        if let Err(e) = tokio::fs::create_dir_all(data_dir).await {
            warn!(dir = ?data_dir, error = %e, "data directory unavailable");
        }

        builder = match TransactionalBackend::open(data_dir.join("transactional.json")).await {
            Ok(backend) => builder.backend(Arc::new(backend)),
            Err(e) => builder.unavailable_backend(BackendKind::Transactional, e.to_string()),
        };

        builder = match SyncKvBackend::open(
            BackendKind::LocalKv,
            data_dir.join("local_kv.json"),
            config.kv_quota_bytes,
        ) {
            Ok(backend) => builder.backend(Arc::new(backend)),
            Err(e) => builder.unavailable_backend(BackendKind::LocalKv, e.to_string()),
        };

        builder.backend(Arc::new(SyncKvBackend::volatile(
            BackendKind::SessionKv,
            config.kv_quota_bytes,
        )))
    }

    pub fn memory_capacity(mut self, max_entries: usize) -> Self {
        self.memory_capacity = max_entries;
        self
    }

    pub fn default_expiry(mut self, expiry: Option<Duration>) -> Self {
        self.default_expiry = expiry;
        self
    }

    pub fn pipeline(mut self, config: PipelineConfig) -> Self {
        self.pipeline = config;
        self
    }

    /// Adds a persistent backend. A later backend of the same kind replaces an
    /// earlier one.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        let kind = backend.kind();
        self.backends.retain(|b| b.kind() != kind);
        self.unopened.retain(|(k, _)| *k != kind);
        self.backends.push(backend);
        self
    }

    /// Records a backend that could not be created at all.
    pub fn unavailable_backend(mut self, kind: BackendKind, reason: impl Into<String>) -> Self {
        self.backends.retain(|b| b.kind() != kind);
        self.unopened.push((kind, reason.into()));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    // == Build ==
    /// Validates the namespace, probes every backend once and assembles the
    /// manager. Backends failing the probe are excluded for its lifetime.
    pub async fn build(self) -> Result<TieredCacheManager> {
        validate_namespace(&self.namespace)?;
        let pipeline = Pipeline::new(self.pipeline)?;

        let mut backends = self.backends;
        if backends.iter().any(|b| b.kind() == BackendKind::Memory) {
            return Err(CacheError::Internal(
                "the memory tier is owned by the manager and cannot be added".into(),
            ));
        }
        backends.sort_by_key(|b| b.kind().priority());

        let mut availability = BackendAvailability {
            available: Vec::new(),
            unavailable: self.unopened,
        };
        let mut persistent = Vec::new();

        for backend in backends {
            let kind = backend.kind();
            let probe = tokio::time::timeout(self.backend_timeout, backend.probe()).await;
            match probe {
                Ok(Ok(())) => {
                    availability.available.push(kind);
                    persistent.push(backend);
                }
                Ok(Err(e)) => {
                    warn!(backend = %kind, error = %e, "backend failed capability probe; excluded");
                    availability.unavailable.push((kind, e.to_string()));
                }
                Err(_) => {
                    warn!(backend = %kind, "backend probe timed out; excluded");
                    availability
                        .unavailable
                        .push((kind, "probe timed out".to_string()));
                }
            }
        }
        availability.unavailable.sort_by_key(|(k, _)| k.priority());

        info!(
            namespace = %self.namespace,
            available = ?availability.available,
            unavailable = availability.unavailable.len(),
            memory_capacity = self.memory_capacity,
            "tiered cache manager ready"
        );

        Ok(TieredCacheManager {
            prefix: format!("{}_", self.namespace),
            namespace: self.namespace,
            memory: MemoryBackend::new(self.memory_capacity),
            persistent,
            availability,
            pipeline,
            clock: self.clock,
            notifier: self.notifier,
            default_expiry: self.default_expiry,
            backend_timeout: self.backend_timeout,
            write_mode: self.write_mode,
            stats: StatsCollector::new(),
            locks: KeyLocks::default(),
            pending_removals: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// Namespaces must be non-empty and free of `_` so `"{namespace}_"` never
/// prefixes another namespace's keys.
fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(CacheError::InvalidNamespace("namespace cannot be empty".into()));
    }
    if namespace.contains('_') {
        return Err(CacheError::InvalidNamespace(format!(
            "namespace '{}' must not contain '_'",
            namespace
        )));
    }
    Ok(())
}
