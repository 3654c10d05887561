//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::error::{CacheError, Result};
use crate::manager::{GetOptions, TieredCacheManager};
use crate::models::{
    BackendQuery, ClearResponse, DeleteResponse, GetResponse, HealthResponse, SetRequest,
    SetResponse, StatsResponse, SweepResponse,
};

/// Application state shared across all handlers.
///
/// The manager synchronizes internally, so handlers share it without an
/// outer lock.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<TieredCacheManager>,
}

impl AppState {
    pub fn new(manager: Arc<TieredCacheManager>) -> Self {
        Self { manager }
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let outcome = state.manager.set(&req.key, &req.value, req.options()).await?;

    Ok(Json(SetResponse::new(req.key, outcome.persisted_to)))
}

/// Handler for GET /get/:key
///
/// `?backend=` restricts the lookup to memory plus that backend.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<BackendQuery>,
) -> Result<Json<GetResponse>> {
    let opts = GetOptions {
        default: None,
        target: query.backend,
    };

    match state.manager.get(&key, opts).await? {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<BackendQuery>,
) -> Result<Json<DeleteResponse>> {
    state.manager.remove(&key, query.backend).await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for DELETE /clear
pub async fn clear_handler(
    State(state): State<AppState>,
    Query(query): Query<BackendQuery>,
) -> Result<Json<ClearResponse>> {
    let report = state.manager.clear(query.backend).await?;

    Ok(Json(ClearResponse::new(state.manager.namespace(), report)))
}

/// Handler for POST /sweep
pub async fn sweep_handler(State(state): State<AppState>) -> Json<SweepResponse> {
    Json(state.manager.clear_expired().await.into())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let manager = &state.manager;

    Json(StatsResponse::new(
        manager.namespace(),
        manager.stats(),
        manager.availability().clone(),
    ))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::from_availability(state.manager.availability()))
}
