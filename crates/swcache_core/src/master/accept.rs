use std::{net::SocketAddr, sync::Arc};

use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use swcache_config::SwcacheConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{Instrument, debug, error, info, instrument};

use crate::{manager::CacheManager, service::handle_request};

pub(crate) async fn bind_listener(listen_addr: &str) -> anyhow::Result<TcpListener> {
    info!(
        target: "swcache::master",
        listen = %listen_addr,
        "Binding listener"
    );

    match TcpListener::bind(listen_addr).await {
        Ok(listener) => {
            info!(
                target: "swcache::master",
                listen = %listen_addr,
                "Bind() successful"
            );
            Ok(listener)
        }
        Err(e) => {
            error!(
                target: "swcache::master",
                listen = %listen_addr,
                error = ?e,
                "Failed to bind listener"
            );
            Err(e.into())
        }
    }
}

struct AcceptedConn {
    stream: TcpStream,
    addr: SocketAddr,
    permit: OwnedSemaphorePermit,
}

async fn accept_with_permit(
    listener: &TcpListener,
    listen_addr: &str,
    semaphore: &Arc<Semaphore>,
) -> anyhow::Result<AcceptedConn> {
    let (stream, addr) = match listener.accept().await {
        Ok(pair) => pair,
        Err(e) => {
            error!(
                target: "swcache::master",
                listen = %listen_addr,
                error = ?e,
                "Failed to accept connection"
            );
            return Err(e.into());
        }
    };

    let permit = match semaphore.clone().acquire_owned().await {
        Ok(p) => p,
        Err(e) => {
            error!(
                target: "swcache::master",
                listen = %listen_addr,
                error = ?e,
                "Failed to acquire connection permit"
            );
            return Err(e.into());
        }
    };

    debug!(
        target: "swcache::master",
        listen = %listen_addr,
        client_addr = %addr,
        available_permits = semaphore.available_permits(),
        "Connection accepted"
    );

    Ok(AcceptedConn {
        stream,
        addr,
        permit,
    })
}

#[instrument(
    skip(listener, semaphore, manager, cfg),
    fields(
        listen = %listen_addr,
        available_permits = semaphore.available_permits(),
    )
)]
pub(crate) async fn accept_loop(
    listener: TcpListener,
    listen_addr: String,
    semaphore: Arc<Semaphore>,
    manager: Arc<CacheManager>,
    cfg: Arc<SwcacheConfig>,
) -> anyhow::Result<()> {
    info!(
        target: "swcache::master",
        listen = %listen_addr,
        "accept_loop started for listening socket"
    );

    let control_path: Arc<str> = Arc::from(cfg.server.control_path());
    let keepalive = cfg.server.keepalive();

    loop {
        let AcceptedConn {
            stream,
            addr,
            permit,
        } = accept_with_permit(&listener, &listen_addr, &semaphore).await?;

        let manager = manager.clone();
        let control_path = control_path.clone();
        let span = tracing::info_span!("connection", client_addr = %addr);

        tokio::spawn(
            async move {
                let _permit = permit;
                let service = service_fn(move |req| {
                    handle_request(req, manager.clone(), control_path.clone())
                });

                if let Err(e) = http1::Builder::new()
                    .keep_alive(keepalive)
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    error!(
                        target: "swcache::master",
                        client_addr = %addr,
                        error = ?e,
                        "Error while serving connection"
                    );
                } else {
                    debug!(
                        target: "swcache::master",
                        client_addr = %addr,
                        "Connection closed; permit released"
                    );
                }
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{accept_loop, bind_listener};
    use crate::manager::tests::{clock, small_config, stub_with_critical};
    use crate::manager::CacheManager;
    use std::sync::Arc;
    use swcache_cache::{CacheKey, CacheStorage};
    use swcache_config::SwcacheConfig;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
        sync::Semaphore,
    };

    async fn roundtrip(addr: std::net::SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(raw.as_bytes()).await.expect("write");
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.expect("read");
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn serves_cache_and_control_endpoint() {
        let stub = stub_with_critical();
        let manager = CacheManager::with_clock(
            small_config(),
            Arc::new(CacheStorage::in_memory()),
            stub.clone(),
            clock(),
        );
        manager.install().await.expect("install");
        manager.activate().await.expect("activate");
        let manager = Arc::new(manager);

        let listener = bind_listener("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let cfg = Arc::new(SwcacheConfig::default());
        tokio::spawn(accept_loop(
            listener,
            addr.to_string(),
            Arc::new(Semaphore::new(4)),
            manager.clone(),
            cfg,
        ));

        stub.set_offline(true);
        let res = roundtrip(
            addr,
            "GET /css/site.css HTTP/1.1\r\nHost: x\r\nSec-Fetch-Dest: style\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(res.starts_with("HTTP/1.1 200"), "{res}");
        assert!(res.ends_with("body{}"), "{res}");

        let res = roundtrip(
            addr,
            "GET /img/x.png HTTP/1.1\r\nHost: x\r\nSec-Fetch-Dest: image\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(res.starts_with("HTTP/1.1 200 Image unavailable"), "{res}");

        let body = r#"{"type":"CLEAR_CACHE"}"#;
        let res = roundtrip(
            addr,
            &format!(
                "POST /__swcache/message HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            ),
        )
        .await;
        assert!(res.starts_with("HTTP/1.1 202"), "{res}");
        assert!(manager.storage().match_any(&CacheKey::get("/")).is_none());

        let res = roundtrip(
            addr,
            "GET /__swcache/message HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(res.starts_with("HTTP/1.1 405"), "{res}");

        let res = roundtrip(addr, "GET /pricing HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
        assert!(res.starts_with("HTTP/1.1 503"), "{res}");
        assert!(res.ends_with("Offline"), "{res}");
    }
}
