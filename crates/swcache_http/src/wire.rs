//! HTTP/1.1 framing for origin exchanges.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::{FetchRequest, FetchResponse};

const MAX_RESPONSE_HEADERS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed response head: {0}")]
    Head(#[from] httparse::Error),
    #[error("incomplete response head")]
    Partial,
    #[error("invalid status code {0}")]
    Status(u16),
    #[error("invalid chunked encoding: {0}")]
    Chunked(&'static str),
    #[error("response body truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "proxy-connection"
            | "keep-alive"
            | "upgrade"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "content-length"
            | "host"
    )
}

/// Serialize a request for the origin. Always `Connection: close`.
pub fn build_http1_request(req: &FetchRequest, host: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + req.body.len());
    out.extend_from_slice(format!("{} {} HTTP/1.1\r\n", req.method, req.url).as_bytes());
    out.extend_from_slice(format!("Host: {host}\r\n").as_bytes());

    for (name, value) in req.headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    if !req.body.is_empty() {
        out.extend_from_slice(format!("Content-Length: {}\r\n", req.body.len()).as_bytes());
    }
    out.extend_from_slice(b"Connection: close\r\n\r\n");
    out.extend_from_slice(&req.body);
    out
}

/// Parse a complete origin response read until EOF.
///
/// `expect_body` is false for responses to `HEAD`.
pub fn parse_http1_response(bytes: &[u8], expect_body: bool) -> Result<FetchResponse, WireError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
    let mut resp = httparse::Response::new(&mut headers);
    let header_len = match resp.parse(bytes)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Err(WireError::Partial),
    };

    let code = resp.code.unwrap_or(500);
    let status = StatusCode::from_u16(code).map_err(|_| WireError::Status(code))?;
    let reason = resp.reason.filter(|r| {
        !r.is_empty() && Some(*r) != status.canonical_reason()
    });

    let mut header_map = HeaderMap::new();
    let mut is_chunked = false;
    let mut content_length: Option<usize> = None;

    for header in resp.headers.iter() {
        let name_lower = header.name.to_ascii_lowercase();
        match name_lower.as_str() {
            "transfer-encoding" => {
                let val = String::from_utf8_lossy(header.value).to_ascii_lowercase();
                if val.split(',').any(|v| v.trim().trim_matches('"') == "chunked") {
                    is_chunked = true;
                }
                continue;
            }
            "content-length" => {
                if let Some(len) = std::str::from_utf8(header.value)
                    .ok()
                    .and_then(|s| s.trim().parse::<usize>().ok())
                {
                    content_length = Some(len);
                }
                continue;
            }
            "connection" | "proxy-connection" | "keep-alive" | "upgrade" => continue,
            _ => {}
        }

        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(header.name.as_bytes()),
            HeaderValue::from_bytes(header.value),
        ) {
            header_map.append(name, value);
        }
    }

    let has_body = expect_body
        && !status.is_informational()
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED;

    if !has_body {
        if let Some(len) = content_length {
            header_map.insert(http::header::CONTENT_LENGTH, HeaderValue::from(len));
        }
        let mut response = FetchResponse::new(status, header_map, Bytes::new());
        response.status_text = reason.map(str::to_string);
        return Ok(response);
    }

    let raw_body = &bytes[header_len..];
    let body = if is_chunked {
        decode_chunked(raw_body)?
    } else if let Some(len) = content_length {
        if raw_body.len() < len {
            return Err(WireError::Truncated {
                expected: len,
                got: raw_body.len(),
            });
        }
        raw_body[..len].to_vec()
    } else {
        raw_body.to_vec()
    };

    header_map.insert(http::header::CONTENT_LENGTH, HeaderValue::from(body.len()));

    let mut response = FetchResponse::new(status, header_map, Bytes::from(body));
    response.status_text = reason.map(str::to_string);
    Ok(response)
}

fn decode_chunked(body: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    let mut input = body;

    loop {
        let Some(line_end) = find_crlf(input) else {
            return Err(WireError::Chunked("missing size line"));
        };
        let line = std::str::from_utf8(&input[..line_end])
            .map_err(|_| WireError::Chunked("size line is not utf-8"))?;
        input = &input[line_end + 2..];

        let size_str = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| WireError::Chunked("invalid chunk size"))?;

        if size == 0 {
            // trailers ignored
            break;
        }

        if input.len() < size + 2 {
            return Err(WireError::Chunked("chunk too short"));
        }

        out.extend_from_slice(&input[..size]);
        input = &input[size..];

        if !input.starts_with(b"\r\n") {
            return Err(WireError::Chunked("missing CRLF after chunk"));
        }
        input = &input[2..];
    }

    Ok(out)
}

fn find_crlf(input: &[u8]) -> Option<usize> {
    input.windows(2).position(|w| w == b"\r\n")
}
