//! polycache - demo server over the pluggable cache
//!
//! Serves the HTTP surface on top of whichever engine `CACHE_DRIVER` selects.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polycache::api::{create_router, AppState};
use polycache::cache::{create_cache, Cache};
use polycache::config::Config;

/// Main entry point for the polycache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the configured cache engine through the factory
/// 4. Create Axum router with all endpoints
/// 5. Start HTTP server on configured port
/// 6. Close the engine after graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polycache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting polycache server");

    let config = Config::from_env();
    let driver = config
        .cache
        .driver()
        .context("Invalid CACHE_DRIVER")?;
    info!(
        "Configuration loaded: driver={}, port={}, cleanup_interval={:?}",
        driver, config.server_port, config.cache.cleanup_interval
    );

    let cache = create_cache(config.cache.clone())
        .await
        .context("Failed to create cache engine")?;
    info!("Cache engine initialized");

    let app = create_router(AppState::new(cache.clone(), driver));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    close_cache(cache);
    info!("Server shutdown complete");
    Ok(())
}

fn close_cache(cache: Arc<dyn Cache>) {
    if let Err(e) = cache.close() {
        warn!("Failed to close cache engine: {}", e);
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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
}
