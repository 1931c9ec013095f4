//! Network fetch primitive.
//!
//! The gateway never talks to the network directly; it goes through a
//! [`Network`] implementation. [`HttpNetwork`] is the reqwest-backed one;
//! tests substitute mocks that count calls or simulate being offline.
//!
//! # Failure semantics
//!
//! A `Network` returns `Ok` for every response the server produced, whatever
//! its status. `Err(MuninnError::Network { .. })` means no response at all
//! (DNS, connect, TLS, timeout, truncated body). The router only falls back
//! to the cache for the latter.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::types::{Request, Response};
use crate::{MuninnError, Result};

/// Hop-by-hop headers, meaningful only for a single connection.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Whether `name` must not be forwarded between connections.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Fetches a request from the network.
#[async_trait]
pub trait Network: Send + Sync {
    /// Implementation name for logging/debugging.
    fn name(&self) -> &str;

    /// Fetch `request`, returning the complete response.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// reqwest-backed network.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    /// Network with a default client and no timeout.
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Network using a pre-configured client (shared connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Network whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MuninnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client))
    }
}

impl Default for HttpNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Network for HttpNetwork {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, request: &Request) -> Result<Response> {
        let url = request.url.as_str();
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            if is_hop_by_hop(name)
                || name.eq_ignore_ascii_case("host")
                || name.eq_ignore_ascii_case("content-length")
            {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| MuninnError::network(url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| MuninnError::network(url, e))?;

        debug!(url, status, bytes = body.len(), "network fetch complete");
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
