//! Matchday Cache runner
//!
//! Opens the persistent cache, keeps it tied to the calendar day and sweeps
//! it under quota pressure until shut down.

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matchday_cache::{spawn_sweep_task, Cache, CacheConfig};

/// Main entry point for the cache runner.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the SQLite-backed cache and start the day tracker
/// 4. Start the periodic eviction sweep
/// 5. Wait for SIGINT/SIGTERM, then stop background tasks
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchday_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Matchday Cache");

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: db={}, quota={} bytes, pressure={}%, default_ttl={:?}",
        config.db_path.display(),
        config.quota_bytes,
        config.pressure_percent,
        config.default_ttl
    );

    let cache = Cache::sqlite(config.clone());
    cache.start().await;

    let quota = cache.get_quota().await;
    info!(
        "Cache ready: {} bytes used, {} bytes available ({}%)",
        quota.used_bytes, quota.available_bytes, quota.percentage
    );

    let sweep_handle = spawn_sweep_task(cache.clone(), config.sweep_interval);

    let shutdown = shutdown_signal().await;

    sweep_handle.abort();
    cache.stop();
    warn!("Background tasks stopped");

    let stats = cache.stats();
    info!(
        "Shutdown complete: {} rollovers, {} evictions",
        stats.rollovers, stats.evictions
    );
    shutdown
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// Fails if a signal handler cannot be installed.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("installing Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("installing SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        }
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
    Ok(())
}
