use axum::body::{Body, Bytes, HttpBody};
use axum::http::{HeaderMap, HeaderName, Method, header};
use axum::response::Response;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::ProxyError;
use crate::metrics::UPSTREAM_LATENCY;

pub enum ForwardBody {
    // already read for the audit, replayed as-is
    Buffered(Bytes),
    Streaming(Body),
}

impl ForwardBody {
    // None when there is nothing to send, so a bodiless GET stays bodiless
    fn into_reqwest(self) -> Option<reqwest::Body> {
        match self {
            ForwardBody::Buffered(bytes) if bytes.is_empty() => None,
            ForwardBody::Buffered(bytes) => Some(reqwest::Body::from(bytes)),
            ForwardBody::Streaming(body) if body.size_hint().exact() == Some(0) => None,
            ForwardBody::Streaming(body) => {
                Some(reqwest::Body::wrap_stream(body.into_data_stream()))
            }
        }
    }
}

// connection-scoped headers that must not cross the proxy
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

pub fn upstream_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if *name == header::HOST || is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn forward(
        &self,
        method: Method,
        target: &str,
        headers: &HeaderMap,
        body: ForwardBody,
    ) -> Result<Response, ProxyError> {
        debug!(%method, url = target, "forwarding upstream");
        let start = Instant::now();

        let mut request = self
            .client
            .request(method, target)
            .headers(upstream_headers(headers));
        if let Some(body) = body.into_reqwest() {
            request = request.body(body);
        }

        let upstream = request
            .send()
            .await
            .map_err(|e| {
                warn!(url = target, error = %e, "upstream request failed");
                ProxyError::Upstream(e.to_string())
            })?;

        UPSTREAM_LATENCY.observe(start.elapsed().as_secs_f64());

        // status and headers verbatim, body streamed chunk by chunk
        let status = upstream.status();
        let mut response_headers = HeaderMap::with_capacity(upstream.headers().len());
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                response_headers.append(name.clone(), value.clone());
            }
        }

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}
