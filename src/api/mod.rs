//! API Module
//!
//! HTTP handlers and routing exposing a manager over REST.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Remove a key from every tier
//! - `DELETE /clear` - Remove every key of the namespace
//! - `POST /sweep` - Run an expiration sweep now
//! - `GET /stats` - Counters and backend availability
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
