use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method};

/// Header browsers use to expose `Request.destination`.
pub const SEC_FETCH_DEST: &str = "sec-fetch-dest";

/// What the page intends to do with the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Document,
    Image,
    Video,
    Audio,
    Style,
    Script,
    Font,
    /// No destination (`fetch()`, XHR, non-browser clients).
    Empty,
    Other(String),
}

impl Destination {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Destination::Document,
            "image" => Destination::Image,
            "video" => Destination::Video,
            "audio" => Destination::Audio,
            "style" => Destination::Style,
            "script" => Destination::Script,
            "font" => Destination::Font,
            "" | "empty" => Destination::Empty,
            other => Destination::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Destination::Document => "document",
            Destination::Image => "image",
            Destination::Video => "video",
            Destination::Audio => "audio",
            Destination::Style => "style",
            Destination::Script => "script",
            Destination::Font => "font",
            Destination::Empty => "empty",
            Destination::Other(other) => other.as_str(),
        };
        f.write_str(s)
    }
}

/// An intercepted request, owned so it can move between tasks.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    /// Origin-relative URL: path plus optional query.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers
            .insert(name, HeaderValue::from_static(value));
        self
    }

    pub fn with_destination(self, destination: &'static str) -> Self {
        self.with_header(SEC_FETCH_DEST, destination)
    }

    pub fn destination(&self) -> Destination {
        self.headers
            .get(SEC_FETCH_DEST)
            .and_then(|v| v.to_str().ok())
            .map(Destination::parse)
            .unwrap_or(Destination::Empty)
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        self.url.split(['?', '#']).next().unwrap_or("/")
    }
}
