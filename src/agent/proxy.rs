//! Reverse proxy to the external agent runtime

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderName, Method};
use bytes::Bytes;
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::debug;

/// Request headers passed through to the runtime
static FORWARDED_HEADERS: [HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::ACCEPT,
    header::AUTHORIZATION,
    HeaderName::from_static("x-request-id"),
];

/// Proxy errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid agent runtime URL: {0}")]
    InvalidUrl(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("agent runtime request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// Forwards requests to the agent runtime
#[derive(Debug, Clone)]
pub struct AgentProxy {
    client: Client,
    base_url: Url,
}

impl AgentProxy {
    /// Only the connect phase is bounded; streamed responses may run long.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, ProxyError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ProxyError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(ProxyError::Client)?;
        Ok(Self { client, base_url })
    }

    /// Runtime URL for a path below `/v1/agent`
    pub fn target(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        let url = self.target(path, query);
        debug!("Forwarding {} {} to agent runtime", method, url);

        let mut request = self.client.request(method, url).body(body);
        for name in FORWARDED_HEADERS.iter() {
            for value in headers.get_all(name) {
                request = request.header(name.clone(), value.clone());
            }
        }

        Ok(request.send().await?)
    }
}
