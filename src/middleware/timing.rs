use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::sync::Arc;

use crate::metrics::RequestObservation;

/// Innermost middleware: the "handler is about to execute" hook.
///
/// Starts the handler stopwatch on the request's `RequestObservation`
/// (installed by the outer rewrite middleware) and, once the handler has
/// produced its response, adds
///
///   Server-Timing  — `handler;dur=<ms>` for the handler run
///
/// Requests that never went through the rewrite middleware pass untouched.
pub async fn mark_handler_start(req: Request, next: Next) -> Response {
    let Some(observation) = req.extensions().get::<Arc<RequestObservation>>().cloned() else {
        return next.run(req).await;
    };

    observation.mark_handler_start();
    let mut response = next.run(req).await;

    // ── Inject response header ──────────────────────────────────
    let server_timing = format!("handler;dur={}", observation.handler_elapsed_ms());
    if let Ok(val) = HeaderValue::from_str(&server_timing) {
        response.headers_mut().append("server-timing", val);
    }

    response
}
