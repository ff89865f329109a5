use axum::{
    extract::Path,
    http::header,
    response::{Html, IntoResponse, Response},
    Json,
};

use super::AppError;

// ─── Demo documents ──────────────────────────────────────────────

const INDEX: &str = r#"<!DOCTYPE html>
<html>
<head><title>web-metrics</title></head>
<body>
<h1>web-metrics</h1>
<p>Every HTML page served here carries a metrics panel in the bottom-right
corner. Try the <a href="/pages/html">plain page</a>, the
<a href="/pages/quoted">quoted-tag page</a> or the
<a href="/api/metrics">JSON snapshot</a>.</p>
</body>
</html>
"#;

const HTML_PAGE: &str = "<html><body><p>Hello from an ordinary page.</p></body></html>";

/// Inline script holding a closing body tag in a string literal; only the
/// real closing sequence at the end is rewritten.
const QUOTED_PAGE: &str = "<html><body><script>const foo = \"</body>\";</script></body>\r\n</html>";

const PLAIN_TEXT: &str = "plain text also qualifies when it ends in </body>\n";

// ─── GET / ───────────────────────────────────────────────────────

pub async fn index() -> Html<&'static str> {
    Html(INDEX)
}

// ─── GET /pages/:name ────────────────────────────────────────────

pub async fn get_page(Path(name): Path<String>) -> Result<Response, AppError> {
    let response = match name.as_str() {
        "html" => Html(HTML_PAGE).into_response(),
        "quoted" => Html(QUOTED_PAGE).into_response(),
        "plain" => ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], PLAIN_TEXT).into_response(),
        "json" => Json(serde_json::json!({ "page": "json", "markup": HTML_PAGE })).into_response(),
        _ => return Err(AppError::NotFound(format!("page '{name}' not found"))),
    };
    Ok(response)
}
