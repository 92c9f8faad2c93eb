//! Reverse proxy to the backend API.
//!
//! The edge made the trust decision; backends receive the original
//! `Authorization` header and the correlation id, and do not re-verify.

use crate::ApiError;
use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderMap, HeaderName, header},
    response::Response,
};

/// Largest request body forwarded.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Connection-scoped headers that must not be forwarded in either direction.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Forward `req` to `target`, keeping method, path, query, headers and body.
pub async fn forward(client: &reqwest::Client, target: &str, req: Request) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", target.trim_end_matches('/'), path);

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);

    let upstream = client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            tracing::warn!("proxy error for {url}: {e}");
            ApiError::BadGateway(e.to_string())
        })?;

    let mut response = Response::builder().status(upstream.status());
    if let Some(out) = response.headers_mut() {
        out.extend(upstream.headers().clone());
        strip_hop_by_hop(out);
    }
    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ApiError::BadGateway(e.to_string()))
}
