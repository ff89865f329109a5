use axum::{middleware as axum_mw, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::{rewrite, timing};
use crate::AppState;

/// Builds the full Axum `Router` with all routes, middleware, and static serving.
pub fn create_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        // ── Demo pages ──────────────────────────────────────────
        .route("/", get(handlers::pages::index))
        .route("/pages/:name", get(handlers::pages::get_page))
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state.clone())
        // ── Serve static directory ──────────────────────────────
        .fallback_service(ServeDir::new(static_dir))
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::mark_handler_start))
        .layer(CorsLayer::permissive())
        .layer(axum_mw::from_fn_with_state(state, rewrite::rewrite_middleware))
}
