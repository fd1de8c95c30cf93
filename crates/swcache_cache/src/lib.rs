//! Named, versioned cache partitions with age-based eviction.

pub mod clock;
mod disk;
pub mod entry;
pub mod error;
pub mod key;
pub mod policy;
pub mod storage;
pub mod store;
pub mod sweep;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, X_CACHE_DATE};
pub use error::CacheError;
pub use key::CacheKey;
pub use policy::CachePolicy;
pub use storage::CacheStorage;
pub use store::Partition;
pub use sweep::{SweepReport, sweep};
