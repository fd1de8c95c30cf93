use std::time::Duration;

use http::{Method, StatusCode};
use swcache_http::FetchResponse;

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub struct CachePolicy;

impl CachePolicy {
    pub const STATIC_MAX_AGE: Duration = DAY;
    pub const DYNAMIC_MAX_AGE: Duration = HOUR;
    pub const IMAGES_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    pub const FONTS_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    /// Period of the background eviction sweep.
    pub const SWEEP_INTERVAL: Duration = HOUR;

    /// Only `GET` requests are ever matched or stored.
    pub fn is_cacheable(method: &Method) -> bool {
        *method == Method::GET
    }

    /// A successful, complete response. Partial content never enters a
    /// partition: it would answer later full requests with a fragment.
    pub fn is_storable(res: &FetchResponse) -> bool {
        res.is_ok() && res.status != StatusCode::PARTIAL_CONTENT
    }

    /// Max entry age for a partition, chosen by name substring.
    pub fn max_age_for(partition: &str) -> Duration {
        if partition.contains("static") {
            Self::STATIC_MAX_AGE
        } else if partition.contains("images") {
            Self::IMAGES_MAX_AGE
        } else if partition.contains("fonts") {
            Self::FONTS_MAX_AGE
        } else {
            Self::DYNAMIC_MAX_AGE
        }
    }
}
