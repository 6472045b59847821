//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! Single-shot: the resolver owns the attempt budget, so transient failures
//! surface immediately as retryable errors.

use std::time::Duration;

use async_trait::async_trait;

use mintfeed_core::error::TransportError;
use mintfeed_core::request::{JsonRpcRequest, JsonRpcResponse};
use mintfeed_core::transport::RpcTransport;

/// Configuration for `HttpRpcClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP JSON-RPC client.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpRpcClient {
    /// Create a new client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            request_timeout: config.request_timeout,
        })
    }

    /// The underlying `reqwest` client, for plain GETs against the same stack.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp.bytes().await.map_err(|e| self.map_reqwest(e))?;
        Ok(serde_json::from_slice::<JsonRpcResponse>(&body)?)
    }

    fn map_reqwest(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let result = self.send_once(&req).await;
        if let Err(e) = &result {
            tracing::debug!(url = %self.url, method = %req.method, error = %e, "HTTP RPC failed");
        }
        result
    }

    fn url(&self) -> &str {
        &self.url
    }
}
