//! Response DTOs for the cache server API

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::backend::{BackendAvailability, BackendKind};
use crate::manager::{CacheStats, ClearReport, SweepReport};

/// Response body for GET /get/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for PUT /set
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub message: String,
    pub key: String,
    /// Persistent backends holding the value; empty = memory only
    pub persisted_to: Vec<BackendKind>,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, persisted_to: Vec<BackendKind>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
            persisted_to,
        }
    }
}

/// Response body for DELETE /del/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /clear
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub namespace: String,
    pub removed: BTreeMap<BackendKind, usize>,
    pub failed: Vec<BackendKind>,
}

impl ClearResponse {
    pub fn new(namespace: impl Into<String>, report: ClearReport) -> Self {
        Self {
            namespace: namespace.into(),
            removed: report.removed,
            failed: report.failed,
        }
    }
}

/// Response body for POST /sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    pub total: usize,
    pub removed: BTreeMap<BackendKind, usize>,
    pub failed: Vec<BackendKind>,
    pub pending_retried: usize,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            total: report.total(),
            removed: report.removed,
            failed: report.failed,
            pending_retried: report.pending_retried,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub namespace: String,
    pub reads: u64,
    pub writes: u64,
    pub hits: u64,
    pub misses: u64,
    /// FIFO evictions from the memory tier
    pub evictions: u64,
    pub memory_entries: usize,
    /// hits / reads
    pub hit_rate: f64,
    pub backends: BackendAvailability,
}

impl StatsResponse {
    pub fn new(namespace: impl Into<String>, stats: CacheStats, backends: BackendAvailability) -> Self {
        Self {
            namespace: namespace.into(),
            hit_rate: stats.hit_rate(),
            reads: stats.reads,
            writes: stats.writes,
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            memory_entries: stats.memory_entries,
            backends,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" when some persistent backend is unavailable
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn from_availability(backends: &BackendAvailability) -> Self {
        let status = if backends.unavailable.is_empty() {
            "healthy"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_response_keeps_structured_value() {
        let resp = GetResponse::new("price_btc", json!({"usd": 64000.5}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["value"]["usd"], 64000.5);
    }

    #[test]
    fn test_set_response_serialize() {
        let resp = SetResponse::new("my_key", vec![BackendKind::Transactional]);
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["message"].as_str().unwrap().contains("my_key"));
        assert_eq!(json["persisted_to"], json!(["transactional"]));
    }

    #[test]
    fn test_stats_response_hit_rate() {
        let stats = CacheStats {
            reads: 100,
            hits: 80,
            misses: 20,
            ..CacheStats::default()
        };
        let resp = StatsResponse::new("app", stats, BackendAvailability::default());
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_stats_response_zero_reads() {
        let resp = StatsResponse::new("app", CacheStats::default(), BackendAvailability::default());
        assert_eq!(resp.hit_rate, 0.0);
    }

    #[test]
    fn test_health_reports_degraded_backends() {
        let healthy = HealthResponse::from_availability(&BackendAvailability::default());
        assert_eq!(healthy.status, "healthy");

        let degraded = HealthResponse::from_availability(&BackendAvailability {
            available: vec![BackendKind::SessionKv],
            unavailable: vec![(BackendKind::LocalKv, "disk full".into())],
        });
        assert_eq!(degraded.status, "degraded");
    }

    #[test]
    fn test_sweep_response_total() {
        let mut report = SweepReport::default();
        report.removed.insert(BackendKind::Memory, 1);
        report.removed.insert(BackendKind::SessionKv, 2);
        let resp = SweepResponse::from(report);
        assert_eq!(resp.total, 3);
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("Something went wrong"));
    }
}
