//! hyper glue: incoming requests in, manager responses out.

use std::{convert::Infallible, sync::Arc};

use bytes::Bytes;
use http::{Method, Request, Response, header};
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, ext::ReasonPhrase};
use swcache_http::{FetchRequest, FetchResponse};
use tracing::{debug, warn};

use crate::{manager::CacheManager, message::ControlMessage};

/// Answer one request on behalf of `manager`. Never fails; every error
/// becomes a response.
pub async fn handle_request(
    req: Request<Incoming>,
    manager: Arc<CacheManager>,
    control_path: Arc<str>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(
                target: "swcache::service",
                error = ?e,
                "Failed to read request body"
            );
            return Ok(into_response(FetchResponse::bad_gateway(), false));
        }
    };

    let fetch_req = FetchRequest {
        url: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
        method: parts.method,
        headers: parts.headers,
        body,
    };

    let is_head = fetch_req.method == Method::HEAD;
    let res = if fetch_req.path() == &*control_path {
        handle_control(&manager, &fetch_req).await
    } else {
        manager.handle_fetch(&fetch_req).await
    };

    debug!(
        target: "swcache::service",
        method = %fetch_req.method,
        url = %fetch_req.url,
        status = res.status.as_u16(),
        "Request answered"
    );

    Ok(into_response(res, is_head))
}

async fn handle_control(manager: &CacheManager, req: &FetchRequest) -> FetchResponse {
    if req.method != Method::POST {
        return FetchResponse::method_not_allowed();
    }

    match ControlMessage::parse(&req.body) {
        Some(msg) => {
            let outcome = manager.handle_message(msg).await;
            debug!(target: "swcache::service", ?outcome, "Control message handled");
        }
        None => {
            debug!(
                target: "swcache::service",
                bytes = req.body.len(),
                "Ignoring malformed control message"
            );
        }
    }
    FetchResponse::accepted()
}

/// Convert to a hyper response. The body length is recomputed by hyper
/// except for HEAD, where the origin's length is kept.
pub(crate) fn into_response(res: FetchResponse, is_head: bool) -> Response<Full<Bytes>> {
    let FetchResponse {
        status,
        status_text,
        mut headers,
        body,
    } = res;

    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONNECTION);
    if !is_head {
        headers.remove(header::CONTENT_LENGTH);
    }

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    if let Some(text) = status_text {
        match ReasonPhrase::try_from(text) {
            Ok(reason) => {
                response.extensions_mut().insert(reason);
            }
            Err(e) => {
                debug!(target: "swcache::service", error = ?e, "Dropping invalid reason phrase");
            }
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::into_response;
    use http::{HeaderMap, StatusCode, header};
    use hyper::ext::ReasonPhrase;
    use swcache_http::FetchResponse;

    #[test]
    fn carries_custom_reason_phrase() {
        let res = into_response(FetchResponse::image_unavailable(), false);
        assert_eq!(res.status(), StatusCode::OK);
        let reason = res.extensions().get::<ReasonPhrase>().expect("reason");
        assert_eq!(reason.as_bytes(), b"Image unavailable");
    }

    #[test]
    fn strips_framing_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, 10u64.into());
        headers.insert(header::CONNECTION, "close".parse().expect("value"));
        headers.insert(header::CONTENT_TYPE, "text/css".parse().expect("value"));
        let res = FetchResponse::new(StatusCode::OK, headers.clone(), "body{}".into());

        let out = into_response(res.clone(), false);
        assert!(out.headers().get(header::CONTENT_LENGTH).is_none());
        assert!(out.headers().get(header::CONNECTION).is_none());
        assert_eq!(out.headers()[header::CONTENT_TYPE], "text/css");

        let head = into_response(res, true);
        assert_eq!(head.headers()[header::CONTENT_LENGTH], "10");
    }
}
