//! Background Tasks Module
//!
//! Tasks that run periodically for the lifetime of a manager.
//!
//! # Tasks
//! - Expiration sweep: removes expired entries from every tier
//! - Remote sync: pulls and applies changes from a sync endpoint

mod sweeper;
mod sync;

pub use sweeper::{spawn_sweeper_task, DEFAULT_SWEEP_INTERVAL};
pub use sync::{
    SyncConfig, SyncCoordinator, SyncRecord, SyncRequest, SyncResponse, CLIENT_ID_KEY,
    DEFAULT_SYNC_INTERVAL, LAST_SYNC_KEY,
};
