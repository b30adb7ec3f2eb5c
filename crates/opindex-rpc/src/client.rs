//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! One POST per call, optional basic-auth credentials, no retry: a failed
//! call surfaces immediately and the crawl controller decides what to do.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use opindex_core::{IndexerError, NodeClient};
use serde_json::Value;

use crate::config::NodeConfig;
use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Ledger-node client over HTTP.
pub struct HttpNodeClient {
    url: String,
    http: reqwest::Client,
    credentials: Option<(String, String)>,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl HttpNodeClient {
    /// Create a client for the given endpoint URL.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            credentials: None,
            request_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    /// Create a client from validated node settings.
    pub fn from_config(config: &NodeConfig) -> Result<Self, TransportError> {
        config.validate()?;
        let client = Self::new(config.url(), config.timeout())?;
        Ok(match (&config.user, &config.password) {
            (Some(user), Some(password)) => client.with_credentials(user, password),
            _ => client,
        })
    }

    /// Authenticate every request with HTTP basic auth.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one request and return the node's result value.
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        tracing::trace!(id, method, "sending RPC request");

        let resp = self.send_once(&req).await?;
        resp.into_result().map_err(|err| {
            tracing::debug!(method, code = err.code, message = %err.message, "node returned error");
            TransportError::Rpc(err)
        })
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let mut builder = self.http.post(&self.url).json(req);
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, Some(password));
        }

        let resp = builder.send().await.map_err(|e| self.map_reqwest(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_reqwest(e))?;

        // the node reports RPC errors with a non-2xx status and a JSON body
        match serde_json::from_str::<JsonRpcResponse>(&body) {
            Ok(parsed) if status.is_success() || parsed.error.is_some() => Ok(parsed),
            Ok(_) => Err(TransportError::Http(format!("HTTP {}: {body}", status.as_u16()))),
            Err(_) if !status.is_success() => {
                Err(TransportError::Http(format!("HTTP {}: {body}", status.as_u16())))
            }
            Err(e) => Err(TransportError::Deserialization(e)),
        }
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
impl NodeClient for HttpNodeClient {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, IndexerError> {
        Ok(self.request(method, params).await?)
    }
}
