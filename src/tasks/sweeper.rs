//! Expiration Sweep Task
//!
//! Background task that periodically removes expired entries from every tier.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::manager::TieredCacheManager;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Spawns a background task that periodically sweeps expired entries.
///
/// The task holds only a weak reference and exits once the manager is
/// dropped. Reads expire entries lazily on their own, so the sweep bounds
/// space, not correctness.
///
/// # Arguments
/// * `manager` - manager whose namespace is swept
/// * `interval` - time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task. Register it with
/// [`TieredCacheManager::register_task`] so `dispose` cancels it.
pub fn spawn_sweeper_task(manager: &Arc<TieredCacheManager>, interval: Duration) -> JoinHandle<()> {
    let manager: Weak<TieredCacheManager> = Arc::downgrade(manager);

    tokio::spawn(async move {
        info!("Starting expiration sweeper with interval of {:?}", interval);

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let Some(manager) = manager.upgrade() else {
                debug!("manager dropped, sweeper exiting");
                return;
            };

            let report = manager.clear_expired().await;

            // Log sweep statistics
            if report.total() > 0 || report.pending_retried > 0 {
                info!(
                    removed = ?report.removed,
                    pending_retried = report.pending_retried,
                    "Expiration sweep: removed {} expired entries",
                    report.total()
                );
            } else {
                debug!("Expiration sweep: no expired entries found");
            }
        }
    })
}
