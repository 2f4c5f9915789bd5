//! HTTP client for the backend model server.

use axum::http::{HeaderMap, HeaderName, Method};
use bytes::Bytes;
use std::time::Duration;
use tokenguard_types::models::config::UpstreamConfig;
use tokenguard_types::GatewayError;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Headers that describe one hop and are never forwarded.
const HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

pub fn is_hop_header(name: &HeaderName) -> bool {
    HOP_HEADERS.contains(&name.as_str())
}

/// Copy of `headers` without hop-specific entries.
pub fn strip_hop_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_header(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Build HTTP client with request and connect timeouts.
pub fn build_http_client(timeout_secs: u64, connect_timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .tcp_nodelay(true)
        .build()
}

pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config.timeout_secs, config.connect_timeout_secs)?,
            base_url: config.base_url().to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send the original method, headers and body to `path_and_query`.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        tracing::debug!(%method, %url, "Forwarding to upstream");

        self.client
            .request(method, &url)
            .headers(strip_hop_headers(headers))
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(&e))
    }

    /// Connect failures and timeouts map to distinct caller-visible errors.
    pub fn classify(&self, err: &reqwest::Error) -> GatewayError {
        if err.is_connect() {
            GatewayError::UpstreamUnreachable { message: err.to_string() }
        } else if err.is_timeout() {
            GatewayError::UpstreamTimeout { duration_secs: self.timeout_secs }
        } else {
            GatewayError::Upstream { message: err.to_string() }
        }
    }

    /// `GET <base>/health` within 5 seconds.
    pub async fn probe_health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).timeout(HEALTH_PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Upstream health probe failed");
                false
            },
        }
    }
}
