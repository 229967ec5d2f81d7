use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use vibe_radar::api;
use vibe_radar::config::Config;
use vibe_radar::scan::TaskRegistry;
use vibe_radar::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("GitHub API: {}", config.github.api_base);
    if config.cron_secret.is_none() {
        tracing::warn!("CRON_SECRET not set - /api/cron/scan accepts unauthenticated requests");
    }

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/api/scan/start", post(api::scan::start_scan))
        .route("/api/scan/stop", post(api::scan::stop_scan))
        .route("/api/scan/status", get(api::scan::scan_status))
        .route("/api/cron/scan", post(api::scan::cron_scan))
        .route("/api/results", get(api::results::list_results))
        .route("/api/results/export", get(api::results::export_results))
        .route(
            "/api/results/backfill-metadata",
            post(api::results::backfill),
        )
        .route("/api/repos/clone", post(api::repos::clone_repo))
        .route("/api/repos/clone-batch", post(api::repos::clone_batch))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let aborted = TaskRegistry::global().abort_all();
    if aborted > 0 {
        tracing::warn!("Aborted {aborted} running scan(s) on shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
