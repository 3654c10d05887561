//! Configuration Module
//!
//! Handles loading and managing configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::manager::WriteMode;
use crate::pipeline::{PipelineConfig, DEFAULT_REDUCTION_THRESHOLD};

/// Runtime configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix isolating this cache's keys on shared backends
    pub namespace: String,
    /// Maximum number of entries the memory tier can hold
    pub memory_max_entries: usize,
    /// Expiry applied to writes without one, in milliseconds (None = never)
    pub default_expiry_ms: Option<u64>,
    /// Expiration sweep interval in seconds
    pub sweep_interval: u64,
    /// Whether the remote sync coordinator runs
    pub sync_enabled: bool,
    /// Remote sync endpoint URL
    pub sync_endpoint: Option<String>,
    /// Remote sync interval in seconds
    pub sync_interval: u64,
    pub obfuscation_enabled: bool,
    pub secret: Option<String>,
    pub reduction_enabled: bool,
    /// Payload size in bytes above which reduction applies
    pub reduction_threshold: usize,
    /// Directory for durable backend snapshots
    pub data_dir: String,
    /// Byte quota of each synchronous key-value store
    pub kv_quota_bytes: usize,
    /// Bound on a single backend call in milliseconds
    pub backend_timeout_ms: u64,
    pub write_mode: WriteMode,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_NAMESPACE` - Key namespace (default: app)
    /// - `MEMORY_MAX_ENTRIES` - Memory tier capacity (default: 100)
    /// - `DEFAULT_EXPIRY_MS` - Default expiry in ms (default: none)
    /// - `SWEEP_INTERVAL` - Sweep frequency in seconds (default: 900)
    /// - `SYNC_ENABLED` - Enable remote sync (default: false)
    /// - `SYNC_ENDPOINT` - Remote sync URL (default: none)
    /// - `SYNC_INTERVAL` - Sync frequency in seconds (default: 300)
    /// - `OBFUSCATION_ENABLED` - Enable the obfuscation stage (default: false)
    /// - `CACHE_SECRET` - Obfuscation secret (default: none)
    /// - `REDUCTION_ENABLED` - Enable the reduction stage (default: false)
    /// - `REDUCTION_THRESHOLD` - Reduction threshold in bytes (default: 1024)
    /// - `DATA_DIR` - Snapshot directory (default: ./data)
    /// - `KV_QUOTA_BYTES` - Key-value store quota (default: 5 MiB)
    /// - `BACKEND_TIMEOUT_MS` - Per-call backend timeout (default: 2000)
    /// - `WRITE_MODE` - `first` or `all` (default: first)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            namespace: env::var("CACHE_NAMESPACE").unwrap_or(defaults.namespace),
            memory_max_entries: parse_env("MEMORY_MAX_ENTRIES").unwrap_or(defaults.memory_max_entries),
            default_expiry_ms: parse_env("DEFAULT_EXPIRY_MS"),
            sweep_interval: parse_env("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            sync_enabled: parse_env("SYNC_ENABLED").unwrap_or(defaults.sync_enabled),
            sync_endpoint: env::var("SYNC_ENDPOINT").ok(),
            sync_interval: parse_env("SYNC_INTERVAL").unwrap_or(defaults.sync_interval),
            obfuscation_enabled: parse_env("OBFUSCATION_ENABLED")
                .unwrap_or(defaults.obfuscation_enabled),
            secret: env::var("CACHE_SECRET").ok(),
            reduction_enabled: parse_env("REDUCTION_ENABLED").unwrap_or(defaults.reduction_enabled),
            reduction_threshold: parse_env("REDUCTION_THRESHOLD")
                .unwrap_or(defaults.reduction_threshold),
            data_dir: env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            kv_quota_bytes: parse_env("KV_QUOTA_BYTES").unwrap_or(defaults.kv_quota_bytes),
            backend_timeout_ms: parse_env("BACKEND_TIMEOUT_MS")
                .unwrap_or(defaults.backend_timeout_ms),
            write_mode: parse_env("WRITE_MODE").unwrap_or(defaults.write_mode),
            server_port: parse_env("SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }

    /// Pipeline stage settings derived from this config.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            obfuscation_enabled: self.obfuscation_enabled,
            secret: self
                .secret
                .as_deref()
                .map(|s| s.as_bytes().to_vec())
                .unwrap_or_default(),
            reduction_enabled: self.reduction_enabled,
            reduction_threshold_bytes: self.reduction_threshold,
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "app".to_string(),
            memory_max_entries: 100,
            default_expiry_ms: None,
            sweep_interval: 15 * 60,
            sync_enabled: false,
            sync_endpoint: None,
            sync_interval: 5 * 60,
            obfuscation_enabled: false,
            secret: None,
            reduction_enabled: false,
            reduction_threshold: DEFAULT_REDUCTION_THRESHOLD,
            data_dir: "./data".to_string(),
            kv_quota_bytes: 5 * 1024 * 1024,
            backend_timeout_ms: 2_000,
            write_mode: WriteMode::FirstAvailable,
            server_port: 3000,
        }
    }
}
