use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::HeaderValue;
use swcache_http::FetchResponse;

/// Insertion timestamp header, milliseconds since the Unix epoch.
pub const X_CACHE_DATE: &str = "x-cache-date";

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub response: FetchResponse,
}

impl CacheEntry {
    /// Wrap a response as-is (no timestamp is added).
    pub fn new(response: FetchResponse) -> Self {
        Self { response }
    }

    /// Wrap a response and record `now` as its insertion time.
    pub fn stamped(mut response: FetchResponse, now: SystemTime) -> Self {
        let millis = now
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        response
            .headers
            .insert(X_CACHE_DATE, HeaderValue::from(millis));
        Self { response }
    }

    /// `None` when the entry carries no (or a garbled) timestamp.
    pub fn stored_at(&self) -> Option<SystemTime> {
        let millis: u64 = self.response.header_str(X_CACHE_DATE)?.trim().parse().ok()?;
        UNIX_EPOCH.checked_add(Duration::from_millis(millis))
    }

    /// Age at `now`; a timestamp in the future counts as zero.
    pub fn age(&self, now: SystemTime) -> Option<Duration> {
        let stored_at = self.stored_at()?;
        Some(now.duration_since(stored_at).unwrap_or(Duration::ZERO))
    }

    pub fn is_older_than(&self, max_age: Duration, now: SystemTime) -> Option<bool> {
        self.age(now).map(|age| age > max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheEntry, X_CACHE_DATE};
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};
    use std::time::{Duration, UNIX_EPOCH};
    use swcache_http::FetchResponse;

    fn response() -> FetchResponse {
        FetchResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::from_static(b"x"))
    }

    #[test]
    fn stamped_entry_reports_age() {
        let t0 = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let entry = CacheEntry::stamped(response(), t0);
        assert_eq!(
            entry.response.header_str(X_CACHE_DATE),
            Some("1700000000000")
        );
        assert_eq!(entry.stored_at(), Some(t0));
        assert_eq!(
            entry.age(t0 + Duration::from_secs(90)),
            Some(Duration::from_secs(90))
        );
        assert_eq!(entry.age(t0 - Duration::from_secs(5)), Some(Duration::ZERO));
    }

    #[test]
    fn unstamped_entry_has_no_age() {
        let entry = CacheEntry::new(response());
        assert_eq!(entry.stored_at(), None);
        assert_eq!(entry.is_older_than(Duration::ZERO, UNIX_EPOCH), None);
    }

    #[test]
    fn garbled_timestamp_is_ignored() {
        let mut res = response();
        res.headers.insert(X_CACHE_DATE, "yesterday".parse().expect("header"));
        assert_eq!(CacheEntry::new(res).stored_at(), None);
    }
}
