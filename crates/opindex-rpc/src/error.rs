//! Transport-level error types.

use opindex_core::IndexerError;
use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur while talking to the node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, bad status, unreadable body).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Error object returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Node settings cannot produce a usable client.
    #[error("Invalid node configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// Returns `true` if this is a node-side error rather than a delivery failure.
    pub fn is_node_error(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

impl From<TransportError> for IndexerError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Rpc(err) => IndexerError::Rpc {
                code: err.code,
                message: err.message,
            },
            TransportError::Config(msg) => IndexerError::Config(msg),
            other => IndexerError::Transport(other.to_string()),
        }
    }
}
