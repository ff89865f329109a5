use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tracing::warn;

use super::aggregate::{AggregateMetrics, AggregateSnapshot};
use crate::AppState;

/// SSE event name carrying an `AggregateSnapshot`.
pub const SNAPSHOT_EVENT: &str = "snapshot";

const KEEP_ALIVE: Duration = Duration::from_secs(15);

/// `GET /api/metrics`: the aggregate as one JSON document.
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<AggregateSnapshot> {
    Json(state.metrics.snapshot())
}

/// `GET /api/metrics/stream`: one `snapshot` event per
/// `config.stream_interval`, the first one immediately.
///
/// `text/event-stream` is not rewritable, so every event leaves the rewrite
/// filter as soon as it is written.
pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let ticks = IntervalStream::new(tokio::time::interval(state.config.stream_interval));
    let events = ticks.map(move |_| Ok(snapshot_event(&state.metrics)));

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE).text("keep-alive"))
}

fn snapshot_event(metrics: &AggregateMetrics) -> Event {
    let snapshot = metrics.snapshot();
    Event::default()
        .event(SNAPSHOT_EVENT)
        .json_data(&snapshot)
        .unwrap_or_else(|err| {
            warn!(error = %err, "metrics snapshot not serializable");
            Event::default().event("error").data("snapshot unavailable")
        })
}

