//! Request and Response models for the cache server API
//!
//! DTOs serialized to and from HTTP bodies and query strings.

pub mod requests;
pub mod responses;

pub use requests::{BackendQuery, SetRequest};
pub use responses::{
    ClearResponse, DeleteResponse, ErrorResponse, GetResponse, HealthResponse, SetResponse,
    StatsResponse, SweepResponse,
};
