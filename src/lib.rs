//! Response-rewriting web metrics.
//!
//! Every eligible response body (`text/html`, `text/plain`) is buffered by a
//! [`io::RewriteFilter`] and, at end of stream, gets a small metrics panel
//! injected in front of its closing `</body>`. Each injection folds the
//! request's timings and body length into the process-wide
//! [`metrics::AggregateMetrics`].

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handlers;
pub mod io;
pub mod metrics;
pub mod middleware;
pub mod server;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Aggregate over every rewritten response — the filter folds samples
    /// in, the JSON/SSE endpoints read snapshots.
    pub metrics: Arc<metrics::AggregateMetrics>,

    pub config: config::Config,
}

impl AppState {
    pub fn new(config: config::Config) -> Self {
        Self {
            metrics: Arc::new(metrics::AggregateMetrics::new()),
            config,
        }
    }
}
