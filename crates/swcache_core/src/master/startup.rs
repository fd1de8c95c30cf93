use std::{sync::Arc, time::Duration};

use swcache_cache::CacheStorage;
use swcache_config::CacheConfig;
use swcache_fetch::{Fetcher, OriginFetcher};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use super::Master;
use crate::{lifecycle::WorkerState, manager::CacheManager};

impl Master {
    pub(super) fn log_startup(&self) {
        info!(target: "swcache::master", "Starting SWCACHE MASTER");
        info!(
            target: "swcache::master",
            max_connections = self.cfg.global.max_connections,
            log_level = %self.cfg.global.log_level,
            "Global configuration loaded"
        );
    }

    pub(super) fn init_semaphore(&self) -> Arc<Semaphore> {
        let max_conns = self.cfg.global.max_connections() as usize;
        let semaphore = Arc::new(Semaphore::new(max_conns));
        info!(
            target: "swcache::master",
            max_conns,
            "Global connection semaphore initialized"
        );
        semaphore
    }

    /// Open storage, install with retries and activate. A version that never
    /// installs is still returned; it passes every request to the origin.
    pub(super) async fn start_manager(&self) -> anyhow::Result<Arc<CacheManager>> {
        let storage = Arc::new(open_storage(&self.cfg.cache).await?);
        let origin = OriginFetcher::from_config(&self.cfg.upstream);
        info!(
            target: "swcache::master",
            origin = %origin.origin(),
            "Origin fetcher ready"
        );
        let fetcher: Arc<dyn Fetcher> = Arc::new(origin);

        let manager = install_with_retries(&self.cfg.cache, storage, fetcher).await;
        if manager.state() != WorkerState::Installed {
            warn!(
                target: "swcache::master",
                state = %manager.state(),
                "Cache version not installed; serving pass-through"
            );
            return Ok(Arc::new(manager));
        }

        let deleted = manager.activate().await?;
        info!(
            target: "swcache::master",
            deleted = deleted.len(),
            "Cache version active"
        );
        Ok(Arc::new(manager))
    }
}

async fn open_storage(cfg: &CacheConfig) -> anyhow::Result<CacheStorage> {
    match cfg.cache_dir() {
        Some(dir) => {
            let storage = CacheStorage::persistent(dir).await?;
            info!(
                target: "swcache::master",
                cache_dir = %dir,
                partitions = storage.keys().len(),
                "Persistent cache storage opened"
            );
            Ok(storage)
        }
        None => {
            info!(target: "swcache::master", "Using in-memory cache storage");
            Ok(CacheStorage::in_memory())
        }
    }
}

/// Each attempt runs on a fresh manager; a failed one is redundant and
/// cannot be installed again. After the last failed attempt the redundant
/// manager is returned.
pub(crate) async fn install_with_retries(
    cfg: &CacheConfig,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
) -> CacheManager {
    let attempts = cfg.install_attempts().max(1);
    let delay = Duration::from_secs(cfg.install_retry_delay_secs());

    let mut attempt = 1;
    loop {
        let manager = CacheManager::new(cfg.clone(), storage.clone(), fetcher.clone());
        match manager.install().await {
            Ok(()) => return manager,
            Err(e) if attempt < attempts => {
                warn!(
                    target: "swcache::master",
                    attempt,
                    attempts,
                    error = %e,
                    "Install attempt failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    target: "swcache::master",
                    attempts,
                    error = %e,
                    "Install failed on every attempt"
                );
                return manager;
            }
        }
    }
}
