//! Node client seam and block fetcher.
//!
//! Uses the JSON-RPC methods `getblockchaininfo`, `getblockhash` and
//! `getblock <hash> 2` (verbose, with transaction detail).

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::IndexerError;

/// Trait for issuing raw calls against the ledger node.
///
/// Implementations fail on any node-side or network error and never retry;
/// retrying is the crawl controller's job.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, IndexerError>;
}

/// Subset of `getblockchaininfo` the crawler needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Height of the best validated block.
    pub blocks: u64,
    /// Height of the best known header.
    pub headers: u64,
}

impl ChainInfo {
    /// Returns `true` once the node has downloaded every known block.
    pub fn is_synced(&self) -> bool {
        self.blocks == self.headers
    }
}

/// A block as returned by `getblock <hash> 2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlock {
    pub hash: String,
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(rename = "tx")]
    pub txs: Vec<RawTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    pub vout: Vec<RawOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOutput {
    #[serde(default)]
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pubkey: RawScript,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawScript {
    pub hex: String,
}

impl RawOutput {
    /// Decoded script bytes; `None` if the node sent invalid hex.
    pub fn script_bytes(&self) -> Option<Vec<u8>> {
        hex::decode(&self.script_pubkey.hex).ok()
    }
}

/// Typed access to the node on top of a [`NodeClient`].
#[derive(Clone)]
pub struct BlockFetcher {
    client: Arc<dyn NodeClient>,
}

impl BlockFetcher {
    pub fn new(client: Arc<dyn NodeClient>) -> Self {
        Self { client }
    }

    /// Raw passthrough call.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, IndexerError> {
        self.client.call(method, params).await
    }

    /// Fetch the node's chain info.
    pub async fn chain_info(&self) -> Result<ChainInfo, IndexerError> {
        self.call_typed("getblockchaininfo", vec![]).await
    }

    /// Current chain height as seen by the node.
    pub async fn chain_height(&self) -> Result<u64, IndexerError> {
        Ok(self.chain_info().await?.blocks)
    }

    /// Resolve a height to its block hash.
    pub async fn block_hash(&self, height: u64) -> Result<String, IndexerError> {
        self.call_typed("getblockhash", vec![json!(height)]).await
    }

    /// Fetch a block with full transaction detail.
    pub async fn block(&self, hash: &str) -> Result<RawBlock, IndexerError> {
        self.call_typed("getblock", vec![json!(hash), json!(2)]).await
    }

    /// Resolve `height` and fetch the block in one go.
    pub async fn block_at(&self, height: u64) -> Result<RawBlock, IndexerError> {
        let hash = self.block_hash(height).await?;
        self.block(&hash).await
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, IndexerError> {
        let value = self.client.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| IndexerError::Transport(format!("malformed {method} response: {e}")))
    }
}
