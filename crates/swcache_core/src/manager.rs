use std::sync::{Arc, RwLock};

use swcache_cache::{
    CacheEntry, CacheKey, CachePolicy, CacheStorage, Clock, SweepReport, SystemClock, sweep,
};
use swcache_config::CacheConfig;
use swcache_fetch::Fetcher;
use swcache_http::{FetchRequest, FetchResponse};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::{
    classify::RequestClass,
    error::InstallError,
    lifecycle::{Lifecycle, LifecycleError, WorkerState},
    message::{CompressionSupport, ControlMessage},
};

/// What a control message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Swept(SweepReport),
    Cleared(usize),
    Recorded(CompressionSupport),
}

/// One cache version: lifecycle, strategies and maintenance over injected
/// storage, network and clock.
pub struct CacheManager {
    pub(crate) cfg: CacheConfig,
    pub(crate) storage: Arc<CacheStorage>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) clock: Arc<dyn Clock>,
    lifecycle: Lifecycle,
    compression: RwLock<Option<CompressionSupport>>,
}

impl CacheManager {
    pub fn new(cfg: CacheConfig, storage: Arc<CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_clock(cfg, storage, fetcher, Arc::new(SystemClock))
    }

    pub fn with_clock(
        cfg: CacheConfig,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cfg,
            storage,
            fetcher,
            clock,
            lifecycle: Lifecycle::default(),
            compression: RwLock::new(None),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    pub fn skips_waiting(&self) -> bool {
        self.lifecycle.skips_waiting()
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    pub fn config(&self) -> &CacheConfig {
        &self.cfg
    }

    /// Last capabilities reported through `COMPRESSION_SUPPORT`.
    pub fn compression_support(&self) -> Option<CompressionSupport> {
        self.compression.read().ok().and_then(|c| *c)
    }

    /// Fetch every critical resource and store them in the static partition.
    /// All-or-nothing: one failure and nothing is stored.
    #[instrument(skip(self), fields(version = %self.cfg.version()))]
    pub async fn install(&self) -> Result<(), InstallError> {
        self.lifecycle.advance(WorkerState::Installing)?;

        match self.populate_critical().await {
            Ok(stored) => {
                self.lifecycle.advance(WorkerState::Installed)?;
                self.lifecycle.skip_waiting();
                info!(
                    target: "swcache::lifecycle",
                    partition = %self.cfg.static_partition(),
                    stored,
                    "Install complete"
                );
                Ok(())
            }
            Err(err) => {
                self.lifecycle.advance(WorkerState::Redundant)?;
                warn!(target: "swcache::lifecycle", error = %err, "Install failed");
                Err(err)
            }
        }
    }

    async fn populate_critical(&self) -> Result<usize, InstallError> {
        let partition = self.storage.open(&self.cfg.static_partition())?;

        let mut tasks = JoinSet::new();
        for (idx, url) in self.cfg.critical_resources().iter().enumerate() {
            let fetcher = self.fetcher.clone();
            let req = FetchRequest::get(url.clone());
            tasks.spawn(async move {
                let result = fetcher.fetch(&req).await;
                (idx, req, result)
            });
        }

        let mut fetched = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let (idx, req, result) = joined?;
            let response = result.map_err(|source| InstallError::Fetch {
                url: req.url.clone(),
                source,
            })?;
            if !CachePolicy::is_storable(&response) {
                return Err(InstallError::Status {
                    url: req.url,
                    status: response.status,
                });
            }
            fetched.push((idx, req, response));
        }
        fetched.sort_by_key(|(idx, _, _)| *idx);

        let now = self.clock.now();
        let stored = fetched.len();
        for (_, req, response) in fetched {
            if let Err(err) = partition
                .put(CacheKey::from_request(&req), CacheEntry::stamped(response, now))
                .await
            {
                warn!(
                    target: "swcache::lifecycle",
                    url = %req.url,
                    error = %err,
                    "Critical resource kept in memory only"
                );
            }
        }
        Ok(stored)
    }

    /// Drop every partition that is not the current static or dynamic one,
    /// then take control. Returns the deleted partition names.
    #[instrument(skip(self), fields(version = %self.cfg.version()))]
    pub async fn activate(&self) -> Result<Vec<String>, LifecycleError> {
        self.lifecycle.advance(WorkerState::Activating)?;

        let keep = [self.cfg.static_partition(), self.cfg.dynamic_partition()];
        let mut deleted = Vec::new();

        for name in self.storage.keys() {
            if keep.contains(&name) {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(_) => deleted.push(name),
                Err(err) => {
                    warn!(
                        target: "swcache::lifecycle",
                        partition = %name,
                        error = %err,
                        "Failed to delete stale partition"
                    );
                }
            }
        }

        self.lifecycle.advance(WorkerState::Activated)?;
        info!(
            target: "swcache::lifecycle",
            deleted = ?deleted,
            "Activated; clients claimed"
        );
        Ok(deleted)
    }

    /// Answer an intercepted request. Never fails: network errors become
    /// cached or synthetic responses.
    #[instrument(skip(self, req), fields(method = %req.method, url = %req.url))]
    pub async fn handle_fetch(&self, req: &FetchRequest) -> FetchResponse {
        if !self.lifecycle.is_active() {
            debug!(
                target: "swcache::manager",
                state = %self.state(),
                "Not controlling yet; passing through"
            );
            return self.passthrough(req).await;
        }

        let class = RequestClass::classify(req);
        debug!(target: "swcache::manager", %class, "Classified request");

        match class {
            RequestClass::Image => self.cache_first_image(req).await,
            RequestClass::Video => self.network_only(req).await,
            RequestClass::StaticAsset => self.cache_first_static(req).await,
            RequestClass::Navigation => self.network_first(req).await,
        }
    }

    pub async fn handle_message(&self, msg: ControlMessage) -> MessageOutcome {
        match msg {
            ControlMessage::CleanupCache => MessageOutcome::Swept(self.cleanup().await),
            ControlMessage::ClearCache => MessageOutcome::Cleared(self.clear().await),
            ControlMessage::CompressionSupport { support } => {
                if let Ok(mut slot) = self.compression.write() {
                    *slot = Some(support);
                }
                debug!(target: "swcache::manager", ?support, "Recorded compression support");
                MessageOutcome::Recorded(support)
            }
        }
    }

    /// Age-based eviction over every partition.
    pub async fn cleanup(&self) -> SweepReport {
        sweep(&self.storage, self.clock.now()).await
    }

    /// Delete every partition regardless of name or age.
    pub async fn clear(&self) -> usize {
        match self.storage.clear().await {
            Ok(removed) => {
                info!(target: "swcache::manager", removed, "Cleared all partitions");
                removed
            }
            Err(err) => {
                warn!(target: "swcache::manager", error = %err, "Clearing partitions failed");
                0
            }
        }
    }

    /// Best-effort prefetch of the lazy resource list into the static
    /// partition. Returns how many were stored.
    pub async fn warm_lazy_resources(&self) -> usize {
        let mut stored = 0;
        for url in self.cfg.lazy_resources() {
            let req = FetchRequest::get(url.clone());
            match self.fetcher.fetch(&req).await {
                Ok(res) if CachePolicy::is_storable(&res) => {
                    self.store(&self.cfg.static_partition(), &req, res).await;
                    stored += 1;
                }
                Ok(res) => {
                    debug!(target: "swcache::manager", %url, status = %res.status, "Lazy resource not stored");
                }
                Err(err) => {
                    debug!(target: "swcache::manager", %url, error = %err, "Lazy resource unreachable");
                }
            }
        }
        stored
    }

    async fn passthrough(&self, req: &FetchRequest) -> FetchResponse {
        match self.fetcher.fetch(req).await {
            Ok(res) => res,
            Err(err) => {
                warn!(target: "swcache::manager", error = %err, "Origin unreachable");
                FetchResponse::bad_gateway()
            }
        }
    }
}
