//! HTTP/1.1 fetcher against a single origin.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use http::Method;
use swcache_config::UpstreamConfig;
use swcache_http::{
    FetchRequest, FetchResponse,
    wire::{build_http1_request, parse_http1_response},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, instrument};

use crate::{FetchError, Fetcher};

const READ_CHUNK: usize = 8 * 1024;

/// One connection per request, `Connection: close`, body read until EOF.
#[derive(Debug, Clone)]
pub struct OriginFetcher {
    origin: String,
    host: String,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    max_response_bytes: usize,
}

impl OriginFetcher {
    pub fn new(origin: impl Into<String>) -> Self {
        let origin = origin.into();
        let defaults = UpstreamConfig::default();
        Self {
            host: origin.clone(),
            origin,
            connect_timeout: Duration::from_secs(defaults.connect_timeout_secs()),
            read_timeout: None,
            max_response_bytes: defaults.max_response_bytes(),
        }
    }

    pub fn from_config(cfg: &UpstreamConfig) -> Self {
        Self {
            origin: cfg.origin().to_string(),
            host: cfg.host_header().to_string(),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs()),
            read_timeout: cfg.read_timeout_secs().map(Duration::from_secs),
            max_response_bytes: cfg.max_response_bytes(),
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

#[async_trait]
impl Fetcher for OriginFetcher {
    #[instrument(skip(self, req), fields(origin = %self.origin, method = %req.method, url = %req.url))]
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut stream = connect_with_timeout(&self.origin, self.connect_timeout).await?;

        let raw_req = build_http1_request(req, &self.host);
        stream.write_all(&raw_req).await?;
        stream.flush().await?;

        let raw = read_to_end_limited(&mut stream, self.max_response_bytes, self.read_timeout).await?;
        if raw.is_empty() {
            return Err(FetchError::Empty);
        }

        let response = parse_http1_response(&raw, req.method != Method::HEAD)?;
        debug!(
            target: "swcache::fetch",
            status = %response.status,
            body_len = response.body.len(),
            "Origin responded"
        );
        Ok(response)
    }
}

/// Connect to the origin with a timeout.
async fn connect_with_timeout(addr: &str, timeout_dur: Duration) -> Result<TcpStream, FetchError> {
    match timeout(timeout_dur, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(FetchError::Connect {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(FetchError::ConnectTimeout {
            addr: addr.to_string(),
            after: timeout_dur,
        }),
    }
}

async fn read_to_end_limited<S>(
    stream: &mut S,
    limit: usize,
    read_timeout: Option<Duration>,
) -> Result<Vec<u8>, FetchError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut tmp = [0u8; READ_CHUNK];

    loop {
        let n = match read_timeout {
            Some(dur) => timeout(dur, stream.read(&mut tmp))
                .await
                .map_err(|_| FetchError::ReadTimeout(dur))??,
            None => stream.read(&mut tmp).await?,
        };
        if n == 0 {
            break;
        }
        if buf.len() + n > limit {
            return Err(FetchError::TooLarge { limit });
        }
        buf.extend_from_slice(&tmp[..n]);
    }

    Ok(buf.to_vec())
}

#[cfg(test)]
mod tests {
    use super::{OriginFetcher, read_to_end_limited};
    use crate::{FetchError, Fetcher};
    use http::StatusCode;
    use std::time::Duration;
    use swcache_http::FetchRequest;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    async fn serve_once(response: &'static [u8]) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut req = Vec::new();
            let mut tmp = [0u8; 1024];
            loop {
                let n = socket.read(&mut tmp).await.expect("read");
                req.extend_from_slice(&tmp[..n]);
                if n == 0 || req.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            socket.write_all(response).await.expect("write");
            socket.shutdown().await.expect("shutdown");
            req
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn fetches_from_origin() {
        let (addr, server) =
            serve_once(b"HTTP/1.1 200 OK\r\nContent-Type: text/css\r\nContent-Length: 4\r\n\r\na{} ").await;
        let fetcher = OriginFetcher::new(addr.clone());

        let res = fetcher
            .fetch(&FetchRequest::get("/css/site.css"))
            .await
            .expect("response");
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(&res.body[..], b"a{} ");

        let sent = String::from_utf8(server.await.expect("join")).expect("utf-8");
        assert!(sent.starts_with("GET /css/site.css HTTP/1.1\r\n"));
        assert!(sent.contains(&format!("Host: {addr}\r\n")));
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        drop(listener);

        let err = OriginFetcher::new(addr)
            .fetch(&FetchRequest::get("/"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Connect { .. }));
    }

    #[tokio::test]
    async fn oversized_response_is_rejected() {
        let mut reader: &[u8] = &[b'x'; 64];
        let err = read_to_end_limited(&mut reader, 16, None).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn silent_origin_hits_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let err = OriginFetcher::new(addr)
            .with_read_timeout(Duration::from_millis(50))
            .fetch(&FetchRequest::get("/"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ReadTimeout(_)));
    }
}
