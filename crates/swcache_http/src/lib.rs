//! HTTP model shared by the cache, the fetcher and the manager.

pub mod request;
pub mod response;
pub mod wire;

pub use request::{Destination, FetchRequest};
pub use response::FetchResponse;
pub use wire::WireError;
