//! The network side of the cache manager.

use async_trait::async_trait;
use swcache_http::{FetchRequest, FetchResponse};

pub mod error;
pub mod origin;

pub use error::FetchError;
pub use origin::OriginFetcher;

/// Performs a request against the network.
///
/// An `Ok` response may carry any status; `Err` means no response arrived
/// at all (the equivalent of a rejected `fetch()`).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse, FetchError>;
}
