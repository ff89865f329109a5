use axum::{
    body::{Body, BodyDataStream},
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
    BoxError,
};
use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::io::{ResponseMeta, RewriteFilter};
use crate::metrics::RequestObservation;
use crate::AppState;

/// Response header carrying the request's sequence id.
pub const REQUEST_ID_HEADER: &str = "x-webmetrics-request";

/// Outermost middleware: the "request begins" hook.
///
/// * allocates the request's `RequestObservation` and starts its request
///   stopwatch,
/// * forces `Accept-Encoding: identity` so the filter never sees compressed
///   bytes,
/// * hands the observation to inner layers through request extensions,
/// * wraps the response body in a `RewriteFilter`, one `write` per body
///   frame and a final `flush` at end of stream.
///
/// Ineligible bodies stream through frame by frame (SSE keeps working);
/// eligible bodies are held until the end of the stream.
pub async fn rewrite_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let observation = Arc::new(RequestObservation::new(req.uri().to_string()));
    observation.mark_request_start();

    req.headers_mut().insert(
        header::ACCEPT_ENCODING,
        HeaderValue::from_static("identity"),
    );
    req.extensions_mut().insert(observation.clone());

    let response = next.run(req).await;
    let (mut parts, body) = response.into_parts();

    let meta = Arc::new(ResponseMeta::from_headers(&parts.headers));
    let rewritable = meta.is_rewritable();
    if rewritable {
        // The injected fragment changes the length.
        parts.headers.remove(header::CONTENT_LENGTH);
    }
    if let Ok(val) = HeaderValue::from_str(&observation.sequence_id().to_string()) {
        parts.headers.insert(REQUEST_ID_HEADER, val);
    }

    debug!(
        request = observation.sequence_id(),
        uri = observation.source_uri(),
        content_type = %meta.content_type(),
        rewritable,
        "response filter attached"
    );

    let filter = RewriteFilter::new(Vec::new(), meta, observation, state.metrics.clone());
    Response::from_parts(parts, Body::from_stream(filtered(body, filter)))
}

// ─── Body plumbing ───────────────────────────────────────────────

struct Filtering {
    frames: BodyDataStream,
    filter: RewriteFilter<Vec<u8>>,
    finished: bool,
}

impl Filtering {
    /// Take whatever the filter has emitted so far.
    fn drain(&mut self) -> Bytes {
        self.filter
            .output_mut()
            .map(std::mem::take)
            .map(Bytes::from)
            .unwrap_or_default()
    }
}

fn filtered(
    body: Body,
    filter: RewriteFilter<Vec<u8>>,
) -> impl Stream<Item = Result<Bytes, BoxError>> + Send + 'static {
    let state = Filtering {
        frames: body.into_data_stream(),
        filter,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        if st.finished {
            return None;
        }

        let item = match st.frames.next().await {
            Some(Ok(chunk)) => st.filter.write_all(&chunk).map(|_| st.drain()),
            Some(Err(err)) => {
                warn!(error = %err, "response body failed mid-stream");
                st.finished = true;
                st.filter.dispose();
                return Some((Err(BoxError::from(err)), st));
            }
            None => {
                st.finished = true;
                let tail = st
                    .filter
                    .finish()
                    .map_err(std::io::Error::from)
                    .map(|_| st.drain());
                st.filter.dispose();
                tail
            }
        };

        Some((item.map_err(BoxError::from), st))
    })
}
