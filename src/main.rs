//! Tiered Cache server
//!
//! Serves one namespaced tiered cache over HTTP, with the expiration sweeper
//! and (optionally) remote sync running in the background.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_cache::api::{create_router, AppState};
use tiered_cache::manager::{ManagerBuilder, TieredCacheManager};
use tiered_cache::notify::BroadcastNotifier;
use tiered_cache::tasks::{spawn_sweeper_task, SyncConfig, SyncCoordinator};
use tiered_cache::Config;

/// Main entry point for the tiered cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open and probe the persistent backends, build the manager
/// 4. Start the expiration sweeper and, if enabled, remote sync
/// 5. Serve the HTTP API until SIGINT/SIGTERM, then dispose the manager
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tiered Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: namespace={}, memory_max_entries={}, write_mode={:?}, port={}, sweep_interval={}s",
        config.namespace,
        config.memory_max_entries,
        config.write_mode,
        config.server_port,
        config.sweep_interval
    );

    let manager = ManagerBuilder::from_config(&config)
        .await
        .notifier(Arc::new(BroadcastNotifier::new(256)))
        .build()
        .await
        .context("failed to build cache manager")?;
    let manager = Arc::new(manager);
    info!(backends = ?manager.availability(), "Cache manager initialized");

    manager.register_task(spawn_sweeper_task(
        &manager,
        Duration::from_secs(config.sweep_interval),
    ));

    match (config.sync_enabled, &config.sync_endpoint) {
        (true, Some(endpoint)) => {
            let sync_config = SyncConfig {
                interval: Duration::from_secs(config.sync_interval),
                ..SyncConfig::new(endpoint.clone())
            };
            let coordinator = SyncCoordinator::new(sync_config)?;
            manager.register_task(coordinator.spawn(&manager));
        }
        (true, None) => warn!("SYNC_ENABLED is set but SYNC_ENDPOINT is missing; sync disabled"),
        _ => {}
    }

    let app = create_router(AppState::new(manager.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(manager))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops background work.
async fn shutdown_signal(manager: Arc<TieredCacheManager>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    manager.dispose();
}
