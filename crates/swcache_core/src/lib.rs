//! The cache manager: lifecycle, strategies, control messages and the
//! process that serves them.

pub mod classify;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod master;
pub mod message;
pub mod service;
pub mod strategy;
mod sweeper;

pub use classify::RequestClass;
pub use error::InstallError;
pub use lifecycle::{LifecycleError, WorkerState};
pub use manager::{CacheManager, MessageOutcome};
pub use message::{CompressionSupport, ControlMessage};
