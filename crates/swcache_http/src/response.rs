use std::time::SystemTime;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// A fully buffered response, cheap to clone (the body is shared).
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    /// Custom reason phrase; `None` uses the canonical one.
    pub status_text: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            status_text: None,
            headers,
            body,
        }
    }

    /// Status in the 200..=299 range.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn reason(&self) -> &str {
        self.status_text
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("")
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header_str(header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Empty `200` served in place of an image the network could not deliver.
    pub fn image_unavailable() -> Self {
        let mut res = synthetic(StatusCode::OK, Bytes::new());
        res.status_text = Some("Image unavailable".into());
        res
    }

    /// Empty `204`: nothing to play.
    pub fn no_content() -> Self {
        synthetic(StatusCode::NO_CONTENT, Bytes::new())
    }

    /// Empty `404` for a static asset with neither network nor cached copy.
    pub fn not_found() -> Self {
        synthetic(StatusCode::NOT_FOUND, Bytes::new())
    }

    /// `503 Offline` for navigations with no cached root document.
    pub fn offline() -> Self {
        synthetic(StatusCode::SERVICE_UNAVAILABLE, Bytes::from_static(b"Offline"))
    }

    pub fn bad_gateway() -> Self {
        synthetic(StatusCode::BAD_GATEWAY, Bytes::from_static(b"Bad Gateway"))
    }

    pub fn accepted() -> Self {
        synthetic(StatusCode::ACCEPTED, Bytes::new())
    }

    pub fn method_not_allowed() -> Self {
        synthetic(
            StatusCode::METHOD_NOT_ALLOWED,
            Bytes::from_static(b"Method Not Allowed"),
        )
    }
}

fn synthetic(status: StatusCode, body: Bytes) -> FetchResponse {
    let mut headers = HeaderMap::new();
    if !body.is_empty() {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(TEXT_PLAIN_UTF8),
        );
    }
    if let Ok(date) = HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::now())) {
        headers.insert(header::DATE, date);
    }
    FetchResponse::new(status, headers, body)
}
