use anyhow::{Context, Result};
use common::config::ServiceConfig;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod context;
mod docs;
mod downloader;
mod error;
mod metadata_extractor;
mod models;
mod pipeline;
mod prober;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting media information service");

    let config = ServiceConfig::from_env()?;
    info!(
        ffprobe = %config.ffprobe_path.display(),
        temp_dir = %config.temp_dir.display(),
        max_processing_secs = config.max_processing_secs,
        "Configuration loaded"
    );

    tokio::fs::create_dir_all(&config.temp_dir)
        .await
        .with_context(|| format!("Failed to create temp dir {}", config.temp_dir.display()))?;

    let bind_address = config.bind_address.clone();
    let app_state = AppState::new(config).context("Failed to build HTTP client")?;
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&bind_address).await?;
    info!("Media information service listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Media information service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
