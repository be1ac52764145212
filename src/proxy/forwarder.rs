//! Upstream request construction and response streaming.
//!
//! The forwarder owns the shared HTTP client (connection reuse per
//! upstream host) and the header hygiene rules: hop-by-hop headers are
//! stripped from the outgoing request, forwarding headers are appended,
//! and transport-level response headers are dropped before the response
//! is handed back. Response bodies are streamed, never buffered.

use crate::registry::Instance;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method},
    response::Response,
};
use bytes::Bytes;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Headers meaningful only on a single transport hop (RFC 7230 §6.1);
/// never forwarded upstream.
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Response headers owned by this hop; the proxy re-frames the body, so
/// upstream values for these must not leak downstream.
const EXCLUDED_RESPONSE_HEADERS: [&str; 4] = [
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
];

/// Transport-level failure talking to a backend. The router reacts by
/// quarantining the instance and retrying the remaining set.
#[derive(Error, Debug)]
#[error("upstream failure: {0}")]
pub struct UpstreamFailure(#[from] reqwest::Error);

pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Forward a request to `instance`, streaming the upstream response
    /// back. The incoming body arrives pre-buffered so the router can
    /// resend it on retry; the deadline covers the whole upstream
    /// transaction.
    pub async fn forward(
        &self,
        method: Method,
        headers: &HeaderMap,
        query: Option<&str>,
        body: Bytes,
        peer_ip: Option<IpAddr>,
        instance: &Instance,
        path: &str,
    ) -> Result<Response, UpstreamFailure> {
        let mut url = format!("http://{}/{}", instance.addr, path.trim_start_matches('/'));
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }

        let upstream_headers = prepare_upstream_headers(headers, &instance.addr, peer_ip);

        debug!(%method, %url, "forwarding request");

        let upstream = self
            .client
            .request(method, &url)
            .headers(upstream_headers)
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(%url, error = %e, "error forwarding request");
                UpstreamFailure(e)
            })?;

        let status = upstream.status();
        let response_headers = filter_response_headers(upstream.headers());
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// Build the header set for the upstream request.
fn prepare_upstream_headers(
    incoming: &HeaderMap,
    instance_addr: &str,
    peer_ip: Option<IpAddr>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in incoming {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) || *name == header::HOST {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    // The backend sees itself as the request target.
    if let Ok(value) = HeaderValue::from_str(instance_addr) {
        headers.insert(header::HOST, value);
    }

    // Append the client origin to any existing X-Forwarded-For chain. The
    // origin is X-Real-IP when the previous hop supplied it, otherwise the
    // socket peer.
    let origin = header_str(incoming, "x-real-ip")
        .map(str::to_owned)
        .or_else(|| peer_ip.map(|ip| ip.to_string()))
        .unwrap_or_default();
    let forwarded_for = match header_str(incoming, "x-forwarded-for") {
        Some(chain) if !chain.is_empty() => format!("{}, {}", chain, origin),
        _ => origin,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert("x-forwarded-for", value);
    }

    let proto = if header_str(incoming, "x-forwarded-proto") == Some("https") {
        "https"
    } else {
        "http"
    };
    headers.insert("x-forwarded-proto", HeaderValue::from_static(proto));

    // Preserve the host the client originally addressed.
    if headers.get("x-forwarded-host").is_none() {
        if let Some(host) = incoming.get(header::HOST) {
            headers.insert("x-forwarded-host", host.clone());
        }
    }

    headers
}

/// Copy upstream response headers, dropping the transport-level ones this
/// hop re-frames.
fn filter_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream {
        if EXCLUDED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
