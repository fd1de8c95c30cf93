//! Per-class fetch strategies.

use http::{HeaderValue, header};
use swcache_cache::{CacheEntry, CacheKey, CachePolicy};
use swcache_http::{FetchRequest, FetchResponse};
use tracing::{debug, warn};

use crate::manager::CacheManager;

pub const X_SW_LARGE_IMAGE: &str = "x-sw-large-image";
const LARGE_IMAGE_BYTES: u64 = 500_000;
const LARGE_IMAGE_CACHE_CONTROL: &str = "public, max-age=2592000";

impl CacheManager {
    /// Images: any partition first, then the network into the dynamic partition.
    pub(crate) async fn cache_first_image(&self, req: &FetchRequest) -> FetchResponse {
        if let Some(hit) = self.lookup(req) {
            return hit;
        }

        match self.fetcher.fetch(req).await {
            Ok(mut res) => {
                if CachePolicy::is_storable(&res) {
                    if self.cfg.image_hints() {
                        tag_large_image(req, &mut res);
                    }
                    self.store(&self.cfg.dynamic_partition(), req, res.clone())
                        .await;
                }
                res
            }
            Err(err) => {
                debug!(target: "swcache::strategy", error = %err, "Image fetch failed");
                FetchResponse::image_unavailable()
            }
        }
    }

    /// CSS/JS: any partition first, then the network into the static partition.
    pub(crate) async fn cache_first_static(&self, req: &FetchRequest) -> FetchResponse {
        if let Some(hit) = self.lookup(req) {
            return hit;
        }

        match self.fetcher.fetch(req).await {
            Ok(res) => {
                if CachePolicy::is_storable(&res) {
                    self.store(&self.cfg.static_partition(), req, res.clone())
                        .await;
                }
                res
            }
            Err(err) => {
                debug!(target: "swcache::strategy", error = %err, "Static asset fetch failed");
                FetchResponse::not_found()
            }
        }
    }

    /// Video: straight to the network, storage untouched.
    pub(crate) async fn network_only(&self, req: &FetchRequest) -> FetchResponse {
        match self.fetcher.fetch(req).await {
            Ok(res) => res,
            Err(err) => {
                debug!(target: "swcache::strategy", error = %err, "Video fetch failed");
                FetchResponse::no_content()
            }
        }
    }

    /// Navigation and everything else: the network wins, the cached root is
    /// the offline fallback. Responses are never stored.
    pub(crate) async fn network_first(&self, req: &FetchRequest) -> FetchResponse {
        match self.fetcher.fetch(req).await {
            Ok(res) => res,
            Err(err) => {
                debug!(target: "swcache::strategy", error = %err, "Navigation fetch failed");
                match self.storage.match_any(&CacheKey::get("/")) {
                    Some(entry) => entry.response,
                    None => FetchResponse::offline(),
                }
            }
        }
    }

    fn lookup(&self, req: &FetchRequest) -> Option<FetchResponse> {
        if !CachePolicy::is_cacheable(&req.method) {
            return None;
        }
        let entry = self.storage.match_any(&CacheKey::from_request(req))?;
        debug!(target: "swcache::strategy", url = %req.url, "Cache hit");
        Some(entry.response)
    }

    /// Stamp and put. Storage failures are logged and dropped.
    pub(crate) async fn store(&self, partition: &str, req: &FetchRequest, res: FetchResponse) {
        if !CachePolicy::is_cacheable(&req.method) || !CachePolicy::is_storable(&res) {
            debug!(
                target: "swcache::strategy",
                url = %req.url,
                status = %res.status,
                "Response not storable"
            );
            return;
        }

        let partition = match self.storage.open(partition) {
            Ok(p) => p,
            Err(err) => {
                warn!(target: "swcache::strategy", %partition, error = %err, "Cannot open partition");
                return;
            }
        };

        let entry = CacheEntry::stamped(res, self.clock.now());
        if let Err(err) = partition.put(CacheKey::from_request(req), entry).await {
            warn!(
                target: "swcache::strategy",
                partition = %partition.name(),
                url = %req.url,
                error = %err,
                "Cache write failed"
            );
        }
    }
}

fn tag_large_image(req: &FetchRequest, res: &mut FetchResponse) {
    let large = res
        .content_length()
        .is_some_and(|len| len > LARGE_IMAGE_BYTES);
    if !large || req.path().contains(".webp") {
        return;
    }

    res.headers
        .insert(X_SW_LARGE_IMAGE, HeaderValue::from_static("true"));
    res.headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(LARGE_IMAGE_CACHE_CONTROL),
    );
}

#[cfg(test)]
mod tests {
    use super::X_SW_LARGE_IMAGE;
    use crate::manager::{
        CacheManager,
        tests::{active_manager, clock, small_config, stub_with_critical},
    };
    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode, header};
    use std::{sync::Arc, time::Duration};
    use swcache_cache::{CacheKey, CacheStorage, X_CACHE_DATE};
    use swcache_http::{FetchRequest, FetchResponse};

    #[tokio::test]
    async fn image_hit_skips_network() {
        let stub = stub_with_critical();
        stub.route("/img/hero.png", StatusCode::OK, b"png-bytes");
        let manager = active_manager(stub.clone(), clock()).await;
        let req = FetchRequest::get("/img/hero.png").with_destination("image");

        let first = manager.handle_fetch(&req).await;
        assert_eq!(&first.body[..], b"png-bytes");
        let calls = stub.calls();

        let second = manager.handle_fetch(&req).await;
        assert_eq!(&second.body[..], b"png-bytes");
        assert_eq!(stub.calls(), calls);

        let dynamic = manager.storage().get("dynamic-v2").expect("dynamic partition");
        let entry = dynamic.get(&CacheKey::get("/img/hero.png")).expect("stored");
        assert!(entry.response.headers.contains_key(X_CACHE_DATE));
    }

    #[tokio::test]
    async fn image_failure_is_synthetic_ok() {
        let stub = stub_with_critical();
        let manager = active_manager(stub.clone(), clock()).await;
        stub.set_offline(true);

        let res = manager
            .handle_fetch(&FetchRequest::get("/img/gone.png").with_destination("image"))
            .await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.reason(), "Image unavailable");
        assert!(res.body.is_empty());
    }

    #[tokio::test]
    async fn image_error_status_is_returned_but_not_stored() {
        let stub = stub_with_critical();
        stub.route("/img/missing.png", StatusCode::NOT_FOUND, b"nope");
        let manager = active_manager(stub, clock()).await;

        let res = manager
            .handle_fetch(&FetchRequest::get("/img/missing.png").with_destination("image"))
            .await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert!(!manager.storage().has("dynamic-v2"));
    }

    #[tokio::test]
    async fn partial_content_is_never_stored() {
        let stub = stub_with_critical();
        stub.route("/img/hero.png", StatusCode::PARTIAL_CONTENT, b"first-bytes");
        stub.route("/js/chunk.js", StatusCode::PARTIAL_CONTENT, b"run(");
        let manager = active_manager(stub.clone(), clock()).await;

        let image = FetchRequest::get("/img/hero.png").with_destination("image");
        let res = manager.handle_fetch(&image).await;
        assert_eq!(res.status, StatusCode::PARTIAL_CONTENT);
        assert!(manager.storage().match_any(&CacheKey::get("/img/hero.png")).is_none());

        stub.route("/img/hero.png", StatusCode::OK, b"full-image-bytes");
        let res = manager.handle_fetch(&image).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(&res.body[..], b"full-image-bytes");

        stub.set_offline(true);
        let res = manager.handle_fetch(&image).await;
        assert_eq!(&res.body[..], b"full-image-bytes");

        stub.set_offline(false);
        let script = FetchRequest::get("/js/chunk.js").with_destination("script");
        manager.handle_fetch(&script).await;
        assert!(manager.storage().match_any(&CacheKey::get("/js/chunk.js")).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_store_one_whole_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stub = stub_with_critical();
        stub.route("/img/hero.png", StatusCode::OK, b"png-bytes");
        stub.route("/css/late.css", StatusCode::OK, b"p{}");
        let storage = Arc::new(CacheStorage::persistent(dir.path()).await.expect("storage"));
        let manager = Arc::new(CacheManager::with_clock(
            small_config(),
            storage,
            stub.clone(),
            clock(),
        ));
        manager.install().await.expect("install");
        manager.activate().await.expect("activate");

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    let req = if i % 2 == 0 {
                        FetchRequest::get("/img/hero.png").with_destination("image")
                    } else {
                        FetchRequest::get("/css/late.css").with_destination("style")
                    };
                    manager.handle_fetch(&req).await
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.expect("join").status, StatusCode::OK);
        }
        drop(manager);

        let reopened = CacheStorage::persistent(dir.path()).await.expect("storage");
        let image = reopened.match_any(&CacheKey::get("/img/hero.png")).expect("image");
        assert_eq!(&image.response.body[..], b"png-bytes");
        assert_eq!(image.response.content_length(), Some(9));
        let style = reopened.match_any(&CacheKey::get("/css/late.css")).expect("style");
        assert_eq!(&style.response.body[..], b"p{}");
    }

    #[tokio::test]
    async fn video_is_never_stored() {
        let stub = stub_with_critical();
        stub.route("/media/intro.mp4", StatusCode::OK, b"frames");
        let manager = active_manager(stub.clone(), clock()).await;
        let before: usize = manager.storage().partitions().iter().map(|p| p.len()).sum();
        let req = FetchRequest::get("/media/intro.mp4").with_destination("video");

        for _ in 0..2 {
            let res = manager.handle_fetch(&req).await;
            assert_eq!(&res.body[..], b"frames");
        }
        let after: usize = manager.storage().partitions().iter().map(|p| p.len()).sum();
        assert_eq!(before, after);
        assert!(manager.storage().match_any(&CacheKey::get("/media/intro.mp4")).is_none());

        stub.set_offline(true);
        let res = manager.handle_fetch(&req).await;
        assert_eq!(res.status, StatusCode::NO_CONTENT);
        assert!(res.body.is_empty());
    }

    #[tokio::test]
    async fn static_asset_served_from_install() {
        let stub = stub_with_critical();
        let manager = active_manager(stub.clone(), clock()).await;
        let calls = stub.calls();
        stub.set_offline(true);

        let res = manager
            .handle_fetch(&FetchRequest::get("/css/site.css").with_destination("style"))
            .await;
        assert_eq!(&res.body[..], b"body{}");
        assert_eq!(stub.calls(), calls);
    }

    #[tokio::test]
    async fn static_asset_miss_goes_to_static_partition() {
        let stub = stub_with_critical();
        stub.route("/js/late.js", StatusCode::OK, b"late()");
        let manager = active_manager(stub.clone(), clock()).await;

        manager
            .handle_fetch(&FetchRequest::get("/js/late.js").with_destination("script"))
            .await;
        let partition = manager.storage().get("static-v2").expect("static");
        assert!(partition.get(&CacheKey::get("/js/late.js")).is_some());

        stub.set_offline(true);
        let res = manager
            .handle_fetch(&FetchRequest::get("/js/other.js").with_destination("script"))
            .await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert!(res.body.is_empty());
    }

    #[tokio::test]
    async fn navigation_is_network_first_and_uncached() {
        let stub = stub_with_critical();
        stub.route("/about", StatusCode::OK, b"about");
        let manager = active_manager(stub.clone(), clock()).await;

        let res = manager.handle_fetch(&FetchRequest::get("/about")).await;
        assert_eq!(&res.body[..], b"about");
        assert!(manager.storage().match_any(&CacheKey::get("/about")).is_none());

        stub.route("/", StatusCode::OK, b"<html>fresh</html>");
        let res = manager.handle_fetch(&FetchRequest::get("/")).await;
        assert_eq!(&res.body[..], b"<html>fresh</html>");
    }

    #[tokio::test]
    async fn offline_navigation_falls_back_to_root() {
        let stub = stub_with_critical();
        let manager = active_manager(stub.clone(), clock()).await;
        stub.set_offline(true);

        let res = manager
            .handle_fetch(&FetchRequest::get("/pricing").with_destination("document"))
            .await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(&res.body[..], b"<html>home</html>");

        manager.clear().await;
        let res = manager.handle_fetch(&FetchRequest::get("/pricing")).await;
        assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&res.body[..], b"Offline");
    }

    #[tokio::test]
    async fn non_get_requests_are_not_cached() {
        let stub = stub_with_critical();
        let manager = active_manager(stub.clone(), clock()).await;
        stub.route("/css/site.css", StatusCode::OK, b"fresh{}");

        let req = FetchRequest::new(Method::POST, "/css/site.css");
        let res = manager.handle_fetch(&req).await;
        assert_eq!(&res.body[..], b"fresh{}");

        let cached = manager
            .storage()
            .match_any(&CacheKey::get("/css/site.css"))
            .expect("install copy");
        assert_eq!(&cached.response.body[..], b"body{}");
        assert!(
            manager
                .storage()
                .match_any(&CacheKey::new("POST", "/css/site.css"))
                .is_none()
        );
    }

    #[tokio::test]
    async fn large_images_get_long_lived_headers() {
        let stub = stub_with_critical();
        let manager = active_manager(stub, clock()).await;
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, 600_000u64.into());
        let res = FetchResponse::new(StatusCode::OK, headers, Bytes::new());

        let mut tagged = res.clone();
        super::tag_large_image(&FetchRequest::get("/img/big.jpg"), &mut tagged);
        assert_eq!(tagged.header_str(X_SW_LARGE_IMAGE), Some("true"));
        assert_eq!(
            tagged.header_str("cache-control"),
            Some("public, max-age=2592000")
        );

        let mut webp = res.clone();
        super::tag_large_image(&FetchRequest::get("/img/big.webp"), &mut webp);
        assert!(webp.header_str(X_SW_LARGE_IMAGE).is_none());

        let mut small = FetchResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::new());
        super::tag_large_image(&FetchRequest::get("/img/small.jpg"), &mut small);
        assert!(small.header_str(X_SW_LARGE_IMAGE).is_none());

        // stored copies carry the hints too
        manager
            .store(
                "dynamic-v2",
                &FetchRequest::get("/img/big.jpg"),
                tagged.clone(),
            )
            .await;
        let stored = manager
            .storage()
            .match_any(&CacheKey::get("/img/big.jpg"))
            .expect("stored");
        assert_eq!(stored.response.header_str(X_SW_LARGE_IMAGE), Some("true"));
    }

    #[tokio::test]
    async fn stale_image_is_still_served_until_swept() {
        let clock = clock();
        let stub = stub_with_critical();
        stub.route("/img/a.png", StatusCode::OK, b"a");
        let manager = active_manager(stub.clone(), clock.clone()).await;
        let req = FetchRequest::get("/img/a.png").with_destination("image");
        manager.handle_fetch(&req).await;

        clock.advance(Duration::from_secs(2 * 3_600));
        let calls = stub.calls();
        manager.handle_fetch(&req).await;
        assert_eq!(stub.calls(), calls);

        manager.cleanup().await;
        manager.handle_fetch(&req).await;
        assert_eq!(stub.calls(), calls + 1);
    }
}
