//! Tiered Cache - a namespaced key-value cache over several storage tiers
//!
//! A bounded in-memory tier sits in front of persistent backends that are
//! probed at startup and consulted in priority order. Values pass through an
//! optional obfuscation and size-reduction pipeline on their way to storage.

pub mod api;
pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod tasks;

pub use api::AppState;
pub use backend::{Backend, BackendKind};
pub use config::Config;
pub use error::{CacheError, Result};
pub use manager::{GetOptions, ManagerBuilder, SetOptions, TieredCacheManager};
pub use tasks::{spawn_sweeper_task, SyncConfig, SyncCoordinator};
