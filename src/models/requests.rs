//! Request DTOs for the cache server API

use serde::Deserialize;
use serde_json::Value;

use crate::backend::BackendKind;
use crate::manager::{Expiry, SetOptions, MAX_KEY_LENGTH};

/// Request body for PUT /set
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    /// Any JSON value
    pub value: Value,
    /// Optional expiry in milliseconds (manager default if absent)
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    /// Write only this backend
    #[serde(default)]
    pub backend: Option<BackendKind>,
}

impl SetRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            ));
        }
        if self.ttl_ms == Some(0) {
            return Some("ttl_ms must be positive".to_string());
        }
        None
    }

    pub fn options(&self) -> SetOptions {
        SetOptions {
            expiry: self
                .ttl_ms
                .map(|ms| Expiry::In(std::time::Duration::from_millis(ms)))
                .unwrap_or_default(),
            target: self.backend,
            ..SetOptions::default()
        }
    }
}

/// Query string selecting a single backend, e.g. `?backend=local_kv`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendQuery {
    #[serde(default)]
    pub backend: Option<BackendKind>,
}
