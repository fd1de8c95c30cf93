use http::StatusCode;
use swcache_cache::CacheError;
use swcache_fetch::FetchError;

use crate::lifecycle::LifecycleError;

/// Why a version could not be installed. Nothing was stored.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("cannot open partition: {0}")]
    Partition(#[from] CacheError),

    #[error("critical resource {url} unreachable: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("critical resource {url} answered {status}")]
    Status { url: String, status: StatusCode },

    #[error("install task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
