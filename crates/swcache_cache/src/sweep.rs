//! Age-based eviction across all partitions.

use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::{CachePolicy, CacheStorage};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub partitions: usize,
    pub scanned: usize,
    pub evicted: usize,
    /// Entries without a usable `x-cache-date`.
    pub skipped: usize,
}

/// Delete every entry older than its partition's max age at `now`.
/// Partitions themselves are left in place.
pub async fn sweep(storage: &CacheStorage, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    for partition in storage.partitions() {
        report.partitions += 1;
        let max_age = CachePolicy::max_age_for(partition.name());

        for key in partition.keys() {
            // Gone since `keys()`: someone else already removed it.
            let Some(entry) = partition.get(&key) else {
                continue;
            };
            report.scanned += 1;

            match entry.is_older_than(max_age, now) {
                None => report.skipped += 1,
                Some(false) => {}
                Some(true) => {
                    if let Err(err) = partition.delete(&key).await {
                        warn!(
                            target: "swcache::sweep",
                            partition = %partition.name(),
                            key = %key,
                            error = %err,
                            "Failed to remove expired entry from disk"
                        );
                    }
                    report.evicted += 1;
                    debug!(
                        target: "swcache::sweep",
                        partition = %partition.name(),
                        key = %key,
                        "Cleaned up expired cache entry"
                    );
                }
            }
        }
    }

    info!(
        target: "swcache::sweep",
        partitions = report.partitions,
        scanned = report.scanned,
        evicted = report.evicted,
        skipped = report.skipped,
        "Eviction sweep finished"
    );

    report
}
