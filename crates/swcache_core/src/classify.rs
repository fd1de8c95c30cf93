use std::fmt;

use swcache_http::{Destination, FetchRequest};

/// Which strategy answers a request. Exactly one class per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Cache-first, stored in the dynamic partition.
    Image,
    /// Network only, never cached.
    Video,
    /// Cache-first, stored in the static partition.
    StaticAsset,
    /// Network-first, never cached, falls back to the cached root.
    Navigation,
}

impl RequestClass {
    /// Rows are checked in order; the last one matches everything.
    pub fn classify(req: &FetchRequest) -> Self {
        match req.destination() {
            Destination::Image => RequestClass::Image,
            Destination::Video => RequestClass::Video,
            _ if req.url.contains(".css") || req.url.contains(".js") => RequestClass::StaticAsset,
            _ => RequestClass::Navigation,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Image => "image",
            RequestClass::Video => "video",
            RequestClass::StaticAsset => "static",
            RequestClass::Navigation => "navigation",
        }
    }
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
