use axum::http::{header, HeaderMap};
use encoding_rs::{Encoding, UTF_8};
use parking_lot::RwLock;

/// Content types eligible for rewriting (case-insensitive prefix match).
const REWRITABLE_CONTENT_TYPES: &[&str] = &["text/html", "text/plain"];

/// Response metadata the rewrite filter consults at flush time.
///
/// The host may change either value mid-response; the filter always reads
/// the current value rather than one cached at construction.
#[derive(Debug)]
pub struct ResponseMeta {
    content_type: RwLock<String>,
    encoding: RwLock<&'static Encoding>,
}

impl ResponseMeta {
    pub fn new(content_type: impl Into<String>, encoding: &'static Encoding) -> Self {
        Self {
            content_type: RwLock::new(content_type.into()),
            encoding: RwLock::new(encoding),
        }
    }

    /// Build from response headers. A missing or unknown `charset`
    /// parameter falls back to UTF-8.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let encoding = charset_of(content_type).unwrap_or(UTF_8);
        Self::new(content_type, encoding)
    }

    pub fn content_type(&self) -> String {
        self.content_type.read().clone()
    }

    pub fn set_content_type(&self, content_type: impl Into<String>) {
        *self.content_type.write() = content_type.into();
    }

    pub fn encoding(&self) -> &'static Encoding {
        *self.encoding.read()
    }

    pub fn set_encoding(&self, encoding: &'static Encoding) {
        *self.encoding.write() = encoding;
    }

    pub fn is_rewritable(&self) -> bool {
        is_rewritable(&self.content_type.read())
    }
}

pub fn is_rewritable(content_type: &str) -> bool {
    REWRITABLE_CONTENT_TYPES.iter().any(|prefix| {
        content_type
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

fn charset_of(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        Encoding::for_label(value.trim().trim_matches('"').as_bytes())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn allow_list_is_a_case_insensitive_prefix_match() {
        assert!(is_rewritable("text/html"));
        assert!(is_rewritable("text/html; charset=utf-8"));
        assert!(is_rewritable("TEXT/HTML"));
        assert!(is_rewritable("Text/Plain;charset=iso-8859-1"));
        assert!(!is_rewritable("application/json"));
        assert!(!is_rewritable("text/event-stream"));
        assert!(!is_rewritable("text/htm"));
        assert!(!is_rewritable(""));
    }

    #[test]
    fn charset_parameter_selects_the_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=\"windows-1252\""),
        );
        let meta = ResponseMeta::from_headers(&headers);
        assert_eq!(meta.encoding(), WINDOWS_1252);
        assert!(meta.is_rewritable());
    }

    #[test]
    fn missing_header_defaults_to_utf8_and_ineligible() {
        let meta = ResponseMeta::from_headers(&HeaderMap::new());
        assert_eq!(meta.encoding(), UTF_8);
        assert_eq!(meta.content_type(), "");
        assert!(!meta.is_rewritable());
    }

    #[test]
    fn setters_replace_current_values() {
        let meta = ResponseMeta::new("application/octet-stream", UTF_8);
        meta.set_content_type("text/plain");
        meta.set_encoding(WINDOWS_1252);
        assert!(meta.is_rewritable());
        assert_eq!(meta.encoding(), WINDOWS_1252);
    }
}
