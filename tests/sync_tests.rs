//! Integration Tests for Remote Sync
//!
//! Runs the sync coordinator against a local axum server standing in for the
//! remote endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use tiered_cache::backend::{BackendKind, SyncKvBackend};
use tiered_cache::clock::ManualClock;
use tiered_cache::manager::{GetOptions, TieredCacheManager};
use tiered_cache::tasks::{SyncConfig, SyncCoordinator, CLIENT_ID_KEY, LAST_SYNC_KEY};
use tiered_cache::CacheError;

// == Fake Remote ==

#[derive(Clone)]
struct FakeRemote {
    status: StatusCode,
    body: Value,
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn sync_handler(
    State(remote): State<FakeRemote>,
    Json(request): Json<Value>,
) -> (StatusCode, Json<Value>) {
    remote.requests.lock().push(request);
    (remote.status, Json(remote.body.clone()))
}

/// Starts the fake remote on an ephemeral port and returns its sync URL.
async fn spawn_remote(status: StatusCode, body: Value) -> (String, Arc<Mutex<Vec<Value>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let remote = FakeRemote {
        status,
        body,
        requests: requests.clone(),
    };
    let app = Router::new()
        .route("/sync", post(sync_handler))
        .with_state(remote);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/sync", addr), requests)
}

fn sync_config(endpoint: String) -> SyncConfig {
    SyncConfig {
        interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
        max_backoff: Duration::from_millis(200),
        ..SyncConfig::new(endpoint)
    }
}

async fn manager(clock: Arc<ManualClock>) -> TieredCacheManager {
    TieredCacheManager::builder("remote")
        .backend(Arc::new(SyncKvBackend::volatile(BackendKind::LocalKv, 1_000_000)))
        .clock(clock)
        .build()
        .await
        .unwrap()
}

fn remote_records() -> Value {
    json!({
        "data": [
            {"key": "live", "value": {"price": 10}, "expiry": null},
            {"key": "stale", "value": "old", "expiry": 5_000},
            {"key": "later", "value": [1, 2, 3], "expiry": 20_000}
        ],
        "serverTime": 10_500
    })
}

// == Tests ==

#[tokio::test]
async fn test_sync_applies_live_records_and_skips_expired() {
    let (endpoint, requests) = spawn_remote(StatusCode::OK, remote_records()).await;
    let clock = Arc::new(ManualClock::new(10_000));
    let manager = manager(clock.clone()).await;
    let mut sync = SyncCoordinator::new(sync_config(endpoint)).unwrap();

    let applied = sync.sync_once(&manager).await.unwrap();
    assert_eq!(applied, 2);

    assert_eq!(
        manager.get("live", GetOptions::default()).await.unwrap(),
        Some(json!({"price": 10}))
    );
    assert_eq!(manager.get("stale", GetOptions::default()).await.unwrap(), None);

    // remote expiry is honoured locally
    clock.set(20_000);
    assert_eq!(manager.get("later", GetOptions::default()).await.unwrap(), None);
    assert_eq!(
        manager.get("live", GetOptions::default()).await.unwrap(),
        Some(json!({"price": 10}))
    );

    let requests = requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["lastSync"], 0);
    assert_eq!(requests[0]["namespace"], "remote");
    assert!(requests[0]["clientId"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn test_last_sync_advances_to_request_start() {
    let (endpoint, requests) = spawn_remote(StatusCode::OK, json!({"data": []})).await;
    let clock = Arc::new(ManualClock::new(10_000));
    let manager = manager(clock.clone()).await;
    let mut sync = SyncCoordinator::new(sync_config(endpoint)).unwrap();

    sync.sync_once(&manager).await.unwrap();
    assert_eq!(sync.last_sync(), Some(10_000));
    let persisted: Option<u64> = manager
        .get_as(LAST_SYNC_KEY, GetOptions::default())
        .await
        .unwrap();
    assert_eq!(persisted, Some(10_000));

    clock.set(30_000);
    sync.sync_once(&manager).await.unwrap();

    let requests = requests.lock();
    assert_eq!(requests[1]["lastSync"], 10_000);
    assert_eq!(requests[0]["clientId"], requests[1]["clientId"]);
}

#[tokio::test]
async fn test_client_id_is_stable_across_coordinators() {
    let (endpoint, requests) = spawn_remote(StatusCode::OK, json!({"data": []})).await;
    let manager = manager(Arc::new(ManualClock::new(1_000))).await;

    let mut first = SyncCoordinator::new(sync_config(endpoint.clone())).unwrap();
    first.sync_once(&manager).await.unwrap();
    let mut second = SyncCoordinator::new(sync_config(endpoint)).unwrap();
    second.sync_once(&manager).await.unwrap();

    let stored = manager.get(CLIENT_ID_KEY, GetOptions::default()).await.unwrap();
    let requests = requests.lock();
    assert_eq!(requests[0]["clientId"], requests[1]["clientId"]);
    assert_eq!(stored, Some(requests[0]["clientId"].clone()));
    // the second coordinator resumed from the persisted timestamp
    assert_eq!(requests[1]["lastSync"], 1_000);
}

#[tokio::test]
async fn test_remote_failure_is_reported_and_state_kept() {
    let (endpoint, _) = spawn_remote(StatusCode::INTERNAL_SERVER_ERROR, json!({})).await;
    let manager = manager(Arc::new(ManualClock::new(10_000))).await;
    let mut sync = SyncCoordinator::new(sync_config(endpoint)).unwrap();

    let err = sync.sync_once(&manager).await.unwrap_err();
    assert!(matches!(err, CacheError::Sync(_)));
    assert_eq!(sync.last_sync(), Some(0));

    let persisted: Option<u64> = manager
        .get_as(LAST_SYNC_KEY, GetOptions::default())
        .await
        .unwrap();
    assert_eq!(persisted, None);
}

#[tokio::test]
async fn test_malformed_response_is_a_sync_error() {
    let (endpoint, _) = spawn_remote(StatusCode::OK, json!({"data": "nope"})).await;
    let manager = manager(Arc::new(ManualClock::new(10_000))).await;
    let mut sync = SyncCoordinator::new(sync_config(endpoint)).unwrap();

    let err = sync.sync_once(&manager).await.unwrap_err();
    assert!(matches!(err, CacheError::Sync(_)));
}

#[tokio::test]
async fn test_spawned_coordinator_runs_until_disposed() {
    let (endpoint, requests) = spawn_remote(StatusCode::OK, remote_records()).await;
    let manager = Arc::new(manager(Arc::new(ManualClock::new(10_000))).await);

    let handle = SyncCoordinator::new(sync_config(endpoint))
        .unwrap()
        .spawn(&manager);
    manager.register_task(handle);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!requests.lock().is_empty());
    assert_eq!(
        manager.get("live", GetOptions::default()).await.unwrap(),
        Some(json!({"price": 10}))
    );

    manager.dispose();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let seen = requests.lock().len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(requests.lock().len(), seen);
}
