//! Periodic eviction sweep.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, info};

use crate::manager::CacheManager;

impl CacheManager {
    /// Run `cleanup` every `period` on its own task. The first tick fires
    /// one period after start.
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        info!(
            target: "swcache::sweep",
            period_secs = period.as_secs(),
            "Starting eviction sweeper"
        );

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = manager.cleanup().await;
                debug!(
                    target: "swcache::sweep",
                    partitions = report.partitions,
                    scanned = report.scanned,
                    evicted = report.evicted,
                    skipped = report.skipped,
                    "Periodic sweep finished"
                );
            }
        })
    }
}
