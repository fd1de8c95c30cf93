use std::sync::Arc;

use swcache_cache::CachePolicy;
use swcache_config::SwcacheConfig;
use tracing::{error, info, instrument, warn};

use self::accept::{accept_loop, bind_listener};
use crate::lifecycle::WorkerState;

mod accept;
mod startup;

pub struct Master {
    cfg: Arc<SwcacheConfig>,
}

impl Master {
    pub fn new(cfg: SwcacheConfig) -> Self {
        Self { cfg: Arc::new(cfg) }
    }

    /// Install and activate the configured cache version, then serve
    /// intercepted requests until Ctrl+C. If install keeps failing, requests
    /// are still served straight from the origin.
    #[instrument(skip(self), fields(
        listen = %self.cfg.server.listen,
        origin = %self.cfg.upstream.origin,
        version = %self.cfg.cache.version,
    ))]
    pub async fn run(self) -> anyhow::Result<()> {
        self.log_startup();

        let manager = self.start_manager().await?;
        manager.start_sweeper(CachePolicy::SWEEP_INTERVAL);

        if manager.state() == WorkerState::Activated {
            let warm = Arc::clone(&manager);
            tokio::spawn(async move {
                let stored = warm.warm_lazy_resources().await;
                info!(target: "swcache::master", stored, "Lazy resources warmed");
            });
        }

        let semaphore = self.init_semaphore();
        let listen_addr = self.cfg.server.listen().to_string();
        let listener = bind_listener(&listen_addr).await?;
        let cfg = self.cfg.clone();

        tokio::spawn(async move {
            let listen_for_log = listen_addr.clone();
            if let Err(e) = accept_loop(listener, listen_addr, semaphore, manager, cfg).await {
                error!(
                    target: "swcache::master",
                    listen = %listen_for_log,
                    error = ?e,
                    "accept_loop exited with an error"
                );
            } else {
                warn!(
                    target: "swcache::master",
                    listen = %listen_for_log,
                    "accept_loop exited cleanly (possible shutdown)"
                );
            }
        });

        info!(
            target: "swcache::master",
            "Master initialized. Waiting for incoming connections (Ctrl+C to stop)..."
        );

        tokio::signal::ctrl_c().await?;
        info!(target: "swcache::master", "Shutdown requested");
        Ok(())
    }
}
