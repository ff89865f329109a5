use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use web_metrics::{config::Config, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── 1. Configuration ─────────────────────────────────────────
    let config = Config::from_env().context("reading configuration")?;
    let addr = config.bind_addr;

    // ── 2. Build shared state ────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(%addr, "server listening");
    info!("dashboard       → http://{addr}/");
    info!("metrics JSON    → http://{addr}/api/metrics");
    info!("metrics SSE     → http://{addr}/api/metrics/stream");

    axum::serve(listener, app)
        .await
        .context("server exited with error")
}
