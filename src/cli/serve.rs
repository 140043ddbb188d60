//! `rostercache serve`: wire the cache together and run the API.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use rostercache::api::{start_server, AppState};
use rostercache::backend::GraphQlFetcher;
use rostercache::cache::{
    CacheStore, HealthMonitor, PlausibilityCheck, RetrievalCoordinator, RetryPolicy, Validator,
};
use rostercache::config::Config;

/// Run until Ctrl+C, then stop the monitor.
pub(crate) async fn cmd_serve(config: Config, no_monitor: bool) -> Result<()> {
    let store = Arc::new(CacheStore::new(config.cache.ttl()));
    let checker: Arc<dyn PlausibilityCheck> =
        Arc::new(Validator::new(config.cache.known_empty_keys.clone()));
    let fetcher =
        GraphQlFetcher::new(&config.backend).context("failed to build backend client")?;

    let coordinator = RetrievalCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&checker),
        Arc::new(fetcher),
        RetryPolicy::from(&config.retry),
    );
    let monitor = Arc::new(HealthMonitor::new(
        store,
        checker,
        config.monitor.interval(),
    ));

    let monitor_handle = if config.monitor.enabled && !no_monitor {
        Some(monitor.start()?)
    } else {
        info!("Cache health monitor disabled");
        None
    };

    info!(
        backend = %config.backend.url,
        ttl_secs = config.cache.ttl_secs,
        known_empty = config.cache.known_empty_keys.len(),
        admin_token = config.server.admin_token.is_some(),
        "Starting roster cache"
    );
    println!("Roster cache API on http://{}", config.server.bind_addr());
    println!("Press Ctrl+C to stop.");

    let state = AppState::new(coordinator, monitor)
        .with_admin_token(config.server.admin_token.clone());
    let served = start_server(&config.server, state, shutdown_signal()).await;

    if let Some(handle) = monitor_handle {
        handle.stop().await;
    }

    served.map_err(|e| anyhow::anyhow!("API server failed: {e}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
