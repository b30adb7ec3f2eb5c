//! opindex-rpc: JSON-RPC access to the ledger node over HTTP.

pub mod client;
pub mod config;
pub mod error;
pub mod request;

pub use client::HttpNodeClient;
pub use config::NodeConfig;
pub use error::TransportError;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
