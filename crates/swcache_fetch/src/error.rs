use std::time::Duration;

use swcache_http::WireError;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {addr} timed out after {after:?}")]
    ConnectTimeout { addr: String, after: Duration },

    #[error("origin read timed out after {0:?}")]
    ReadTimeout(Duration),

    #[error("origin I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("origin response exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("origin closed the connection without a response")]
    Empty,

    #[error(transparent)]
    Wire(#[from] WireError),
}
