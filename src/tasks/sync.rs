//! Remote Sync Task
//!
//! Periodically pulls records newer than the last successful sync from a
//! remote endpoint and applies them locally. Failures are logged and retried
//! with exponential backoff; storage callers never see them.

use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CacheError, Result};
use crate::manager::{Expiry, GetOptions, SetOptions, TieredCacheManager};
use crate::notify::ChangeOrigin;

/// Logical key of the persisted client identifier.
pub const CLIENT_ID_KEY: &str = "__sync_client_id";
/// Logical key of the persisted last-sync timestamp.
pub const LAST_SYNC_KEY: &str = "__sync_last";

/// Default interval between sync rounds.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

// == Wire Format ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub last_sync: u64,
    pub namespace: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncRecord {
    pub key: String,
    pub value: Value,
    /// Absolute Unix milliseconds; None = never expires
    #[serde(default)]
    pub expiry: Option<u64>,
}

/// Unknown fields next to `data` are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub data: Vec<SyncRecord>,
}

// == Sync Config ==
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub endpoint: String,
    pub interval: Duration,
    pub request_timeout: Duration,
    /// Upper bound of the retry delay after repeated failures
    pub max_backoff: Duration,
}

impl SyncConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            interval: DEFAULT_SYNC_INTERVAL,
            request_timeout: Duration::from_secs(30),
            max_backoff: Duration::from_secs(60 * 60),
        }
    }
}

// == Sync Coordinator ==
#[derive(Debug)]
pub struct SyncCoordinator {
    config: SyncConfig,
    client: reqwest::Client,
    client_id: Option<String>,
    last_sync: Option<u64>,
    consecutive_failures: u32,
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CacheError::Sync(e.to_string()))?;

        Ok(Self {
            config,
            client,
            client_id: None,
            last_sync: None,
            consecutive_failures: 0,
        })
    }

    pub fn last_sync(&self) -> Option<u64> {
        self.last_sync
    }

    /// Loads the persisted client id, generating and storing one on first use.
    pub async fn client_id(&mut self, manager: &TieredCacheManager) -> Result<String> {
        if let Some(id) = &self.client_id {
            return Ok(id.clone());
        }

        let stored = manager.get(CLIENT_ID_KEY, GetOptions::default()).await?;
        let id = match stored {
            Some(Value::String(id)) => id,
            _ => {
                let id = Uuid::new_v4().to_string();
                let opts = SetOptions {
                    expiry: Expiry::Never,
                    target: manager.most_durable_backend(),
                    origin: ChangeOrigin::Sync,
                };
                if let Err(e) = manager.set(CLIENT_ID_KEY, &Value::String(id.clone()), opts).await {
                    warn!(error = %e, "client id not persisted; it will change next session");
                }
                info!(client_id = %id, "generated sync client id");
                id
            }
        };

        self.client_id = Some(id.clone());
        Ok(id)
    }

    async fn load_last_sync(&mut self, manager: &TieredCacheManager) -> Result<u64> {
        if let Some(at) = self.last_sync {
            return Ok(at);
        }
        let at = manager
            .get_as::<u64>(LAST_SYNC_KEY, GetOptions::default())
            .await
            .unwrap_or(None)
            .unwrap_or(0);
        self.last_sync = Some(at);
        Ok(at)
    }

    // == Sync Once ==
    /// Runs a single round. Returns the number of records applied.
    pub async fn sync_once(&mut self, manager: &TieredCacheManager) -> Result<usize> {
        let client_id = self.client_id(manager).await?;
        let last_sync = self.load_last_sync(manager).await?;
        // records written while the request is in flight are picked up next round
        let started_at = manager.clock().now_ms();

        let request = SyncRequest {
            last_sync,
            namespace: manager.namespace().to_string(),
            client_id,
        };

        let response: SyncResponse = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CacheError::Sync(e.to_string()))?
            .json()
            .await
            .map_err(|e| CacheError::Sync(format!("malformed response: {}", e)))?;

        let now = manager.clock().now_ms();
        let mut applied = 0;
        for record in response.data {
            if record.expiry.is_some_and(|at| at <= now) {
                debug!(key = %record.key, "skipping already expired record");
                continue;
            }
            let opts = SetOptions {
                expiry: record.expiry.map(Expiry::At).unwrap_or(Expiry::Never),
                target: None,
                origin: ChangeOrigin::Sync,
            };
            match manager.set(&record.key, &record.value, opts).await {
                Ok(_) => applied += 1,
                Err(e) => warn!(key = %record.key, error = %e, "sync record rejected"),
            }
        }

        self.last_sync = Some(started_at);
        let opts = SetOptions {
            expiry: Expiry::Never,
            target: manager.most_durable_backend(),
            origin: ChangeOrigin::Sync,
        };
        if let Err(e) = manager.set_as(LAST_SYNC_KEY, &started_at, opts).await {
            warn!(error = %e, "last sync timestamp not persisted");
        }

        Ok(applied)
    }

    /// Delay before the next round: the interval while healthy, exponential
    /// backoff with up to 25% jitter after failures.
    pub fn next_delay(&self) -> Duration {
        if self.consecutive_failures == 0 {
            return self.config.interval;
        }
        let factor = 1u32 << self.consecutive_failures.min(16);
        let backoff = self
            .config
            .interval
            .saturating_mul(factor)
            .min(self.config.max_backoff);
        let jitter_ms = (backoff.as_millis() / 4) as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        backoff + Duration::from_millis(jitter)
    }

    fn record_outcome(&mut self, outcome: &Result<usize>) {
        match outcome {
            Ok(applied) => {
                self.consecutive_failures = 0;
                info!(applied, "sync round complete");
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    error = %e,
                    failures = self.consecutive_failures,
                    "sync round failed; will retry"
                );
            }
        }
    }

    // == Spawn ==
    /// Runs rounds forever on a background task holding a weak manager
    /// reference. Register the handle with the manager so `dispose` stops it.
    pub fn spawn(mut self, manager: &Arc<TieredCacheManager>) -> JoinHandle<()> {
        let manager: Weak<TieredCacheManager> = Arc::downgrade(manager);

        tokio::spawn(async move {
            info!(endpoint = %self.config.endpoint, "Starting sync coordinator");

            loop {
                tokio::time::sleep(self.next_delay()).await;

                let Some(manager) = manager.upgrade() else {
                    debug!("manager dropped, sync coordinator exiting");
                    return;
                };

                let outcome = self.sync_once(&manager).await;
                self.record_outcome(&outcome);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(interval_ms: u64, max_backoff_ms: u64) -> SyncCoordinator {
        SyncCoordinator::new(SyncConfig {
            endpoint: "http://127.0.0.1:9/sync".into(),
            interval: Duration::from_millis(interval_ms),
            request_timeout: Duration::from_millis(200),
            max_backoff: Duration::from_millis(max_backoff_ms),
        })
        .unwrap()
    }

    #[test]
    fn test_request_wire_shape() {
        let request = SyncRequest {
            last_sync: 5,
            namespace: "app".into(),
            client_id: "abc".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"lastSync": 5, "namespace": "app", "clientId": "abc"}));
    }

    #[test]
    fn test_response_tolerates_extra_fields_and_null_expiry() {
        let raw = r#"{"data":[{"key":"a","value":1,"expiry":null},{"key":"b","value":[true]}],"serverTime":9}"#;
        let response: SyncResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.data.len(), 2);
        assert!(response.data.iter().all(|r| r.expiry.is_none()));
    }

    #[test]
    fn test_next_delay_backs_off_and_caps() {
        let mut sync = coordinator(1_000, 10_000);
        assert_eq!(sync.next_delay(), Duration::from_millis(1_000));

        sync.record_outcome(&Err(CacheError::Sync("down".into())));
        let first = sync.next_delay();
        assert!(first >= Duration::from_millis(2_000) && first <= Duration::from_millis(2_500));

        for _ in 0..10 {
            sync.record_outcome(&Err(CacheError::Sync("down".into())));
        }
        let capped = sync.next_delay();
        assert!(capped >= Duration::from_millis(10_000) && capped <= Duration::from_millis(12_500));

        sync.record_outcome(&Ok(0));
        assert_eq!(sync.next_delay(), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_sync_error() {
        let manager = TieredCacheManager::builder("app").build().await.unwrap();
        let mut sync = coordinator(1_000, 1_000);

        let err = sync.sync_once(&manager).await.unwrap_err();
        assert!(matches!(err, CacheError::Sync(_)));
        assert_eq!(sync.last_sync(), Some(0));
    }
}
