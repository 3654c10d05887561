//! Error types for the tiered cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::backend::BackendKind;
use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the tiered cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backend failed its probe, raised, or timed out for this operation
    #[error("Backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: BackendKind, reason: String },

    /// Backend medium is full
    #[error("Backend {backend} quota exceeded: needed {needed} bytes, {available} available")]
    QuotaExceeded {
        backend: BackendKind,
        needed: usize,
        available: usize,
    },

    /// Value could not be encoded or a stored payload could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No backend could satisfy the request
    #[error("All backends failed: {0}")]
    AllBackendsFailed(String),

    /// Key rejected before reaching any backend
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Malformed request body (HTTP surface only)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Namespace rejected at construction
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Key has no live value (HTTP surface only)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Remote reconciliation failed
    #[error("Sync error: {0}")]
    Sync(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Shorthand for a `BackendUnavailable` error.
    pub fn unavailable(backend: BackendKind, reason: impl Into<String>) -> Self {
        CacheError::BackendUnavailable {
            backend,
            reason: reason.into(),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidKey(_)
            | CacheError::InvalidRequest(_)
            | CacheError::InvalidNamespace(_) => StatusCode::BAD_REQUEST,
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::BackendUnavailable { .. }
            | CacheError::QuotaExceeded { .. }
            | CacheError::AllBackendsFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Sync(_) => StatusCode::BAD_GATEWAY,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the tiered cache.
pub type Result<T> = std::result::Result<T, CacheError>;
