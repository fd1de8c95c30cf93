use std::fmt;

use serde::{Deserialize, Serialize};
use swcache_http::FetchRequest;

/// Request identity inside a partition.
#[derive(Hash, Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct CacheKey {
    pub method: String,
    pub url: String,
}

impl CacheKey {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }

    pub fn from_request(req: &FetchRequest) -> Self {
        Self::new(req.method.as_str(), &req.url)
    }

    /// Stable file stem for on-disk storage (FNV-1a, 64 bit).
    pub fn file_stem(&self) -> String {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in self
            .method
            .bytes()
            .chain(std::iter::once(b' '))
            .chain(self.url.bytes())
        {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        format!("{hash:016x}")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
