use crate::metrics::{AggregateMetrics, RequestObservation};

const CLOSE_BODY: &str = "</body>";
const CLOSE_HTML: &str = "</html>";

/// Build the markup injected in place of a matched closing sequence.
///
/// Samples `content_length` into the observation and folds it into the
/// aggregate *before* formatting, so the figures shown already include the
/// current request. `</html>` is re-appended only when `matched` had one.
pub fn generate(
    matched: &str,
    content_length: u64,
    observation: &RequestObservation,
    aggregate: &AggregateMetrics,
) -> String {
    observation.sample_response_length(content_length);
    aggregate.observe(observation);

    let snap = aggregate.snapshot();
    let body = snap.body_length;

    let mut fragment = format!(
        concat!(
            r#"<div class="webmetrics" style="position:fixed;bottom:8px;right:8px;z-index:93600;text-align:right;font-size:0.7em">"#,
            r#"<div class="webmetrics-time">Request {request}ms, Handler {handler}ms</div>"#,
            r#"<div class="webmetrics-size">Min {min}bytes, Max {max}bytes, Avg. {mean}bytes</div>"#,
            r#"<div class="webmetrics-misc">{total} requests @ {rate}req/min</div>"#,
            r#"</div>"#,
        ),
        request = observation.request_elapsed_ms(),
        handler = observation.handler_elapsed_ms(),
        min = body.minimum,
        max = body.maximum,
        mean = body.mean,
        total = snap.total_observed_requests,
        rate = snap.requests_per_minute,
    );

    fragment.push_str(CLOSE_BODY);
    if contains_close_html(matched) {
        fragment.push_str(CLOSE_HTML);
    }
    fragment
}

fn contains_close_html(matched: &str) -> bool {
    matched.to_ascii_lowercase().contains(CLOSE_HTML)
}
