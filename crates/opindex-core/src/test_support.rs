//! Scripted node and failure-injecting store shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::IndexerError;
use crate::fetcher::{NodeClient, RawOutput, RawScript, RawTransaction};
use crate::store::{MemoryRecordStore, RecordStore};
use crate::types::{ErroredBlock, TaggedRecord};

/// OP_RETURN output script carrying `data` in a single push.
pub fn op_return_script(data: &[u8]) -> String {
    assert!(data.len() <= 75, "test payloads use direct pushes");
    let mut script = vec![0x6a, data.len() as u8];
    script.extend_from_slice(data);
    hex::encode(script)
}

fn output(n: u32, hex: String) -> RawOutput {
    RawOutput { n, script_pubkey: RawScript { hex } }
}

/// A transaction with one payment output followed by one OP_RETURN output per payload.
pub fn data_tx(txid: &str, payloads: &[&[u8]]) -> RawTransaction {
    let mut vout = vec![output(0, "0014".to_string() + &"ab".repeat(20))];
    for (i, payload) in payloads.iter().enumerate() {
        vout.push(output(i as u32 + 1, op_return_script(payload)));
    }
    RawTransaction { txid: txid.into(), vout }
}

/// A transaction without any OP_RETURN output.
pub fn plain_tx(txid: &str) -> RawTransaction {
    RawTransaction {
        txid: txid.into(),
        vout: vec![output(0, "76a914".to_string() + &"cd".repeat(20) + "88ac")],
    }
}

/// In-process stand-in for a ledger node.
#[derive(Default)]
pub struct MockNode {
    blocks: Mutex<HashMap<u64, Vec<RawTransaction>>>,
    chain_height: Mutex<Option<u64>>,
    failures: Mutex<HashMap<u64, u32>>,
    fetched: Mutex<Vec<u64>>,
    down: AtomicBool,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_for(height: u64) -> String {
        format!("{height:064x}")
    }

    pub fn add_block(&self, height: u64, txs: Vec<RawTransaction>) {
        self.blocks.lock().unwrap().insert(height, txs);
    }

    /// Add a block carrying one payload named after its height.
    pub fn add_data_block(&self, height: u64) {
        let payload = format!("payload-{height}");
        self.add_block(height, vec![data_tx(&format!("tx{height}"), &[payload.as_bytes()])]);
    }

    /// Override the reported chain height (defaults to the highest block).
    pub fn set_chain_height(&self, height: u64) {
        *self.chain_height.lock().unwrap() = Some(height);
    }

    /// Make the next `times` fetches of `height` fail.
    pub fn fail_height(&self, height: u64, times: u32) {
        self.failures.lock().unwrap().insert(height, times);
    }

    /// Make every call fail until toggled back.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Heights requested via `getblockhash`, in call order.
    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn clear_fetched(&self) {
        self.fetched.lock().unwrap().clear();
    }

    fn block_hash(&self, height: u64) -> Result<Value, IndexerError> {
        self.fetched.lock().unwrap().push(height);
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&height) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(IndexerError::Transport("connection reset by peer".into()));
            }
        }
        if self.blocks.lock().unwrap().contains_key(&height) {
            Ok(json!(Self::hash_for(height)))
        } else {
            Err(IndexerError::Rpc { code: -8, message: "Block height out of range".into() })
        }
    }

    fn block(&self, hash: &str) -> Result<Value, IndexerError> {
        let blocks = self.blocks.lock().unwrap();
        let (height, txs) = blocks
            .iter()
            .find(|(h, _)| Self::hash_for(**h) == hash)
            .ok_or_else(|| IndexerError::Rpc { code: -5, message: "Block not found".into() })?;
        Ok(json!({ "hash": hash, "height": height, "tx": txs }))
    }

    fn chain_info(&self) -> Value {
        let height = self
            .chain_height
            .lock()
            .unwrap()
            .or_else(|| self.blocks.lock().unwrap().keys().max().copied())
            .unwrap_or(0);
        json!({ "chain": "regtest", "blocks": height, "headers": height })
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, IndexerError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(IndexerError::Transport("connection refused".into()));
        }
        match method {
            "getblockchaininfo" => Ok(self.chain_info()),
            "getblockhash" => {
                let height = params.first().and_then(Value::as_u64).unwrap_or_default();
                self.block_hash(height)
            }
            "getblock" => {
                let hash = params.first().and_then(Value::as_str).unwrap_or_default();
                self.block(hash)
            }
            other => Err(IndexerError::Rpc { code: -32601, message: format!("Method not found: {other}") }),
        }
    }
}

/// Memory store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryRecordStore,
    fail_upserts: AtomicBool,
    fail_clears: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryRecordStore {
        &self.inner
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_clears(&self, fail: bool) {
        self.fail_clears.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn upsert_record(&self, record: TaggedRecord) -> Result<TaggedRecord, IndexerError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(IndexerError::Storage("connection terminated".into()));
        }
        self.inner.upsert_record(record).await
    }

    async fn mark_errored(&self, height: u64) -> Result<(), IndexerError> {
        self.inner.mark_errored(height).await
    }

    async fn clear_errored(&self, height: u64) -> Result<(), IndexerError> {
        if self.fail_clears.load(Ordering::SeqCst) {
            return Err(IndexerError::Storage("connection terminated".into()));
        }
        self.inner.clear_errored(height).await
    }

    async fn list_errored(&self) -> Result<Vec<ErroredBlock>, IndexerError> {
        self.inner.list_errored().await
    }

    async fn errored_block(&self, height: u64) -> Result<Option<ErroredBlock>, IndexerError> {
        self.inner.errored_block(height).await
    }

    async fn last_indexed_height(&self) -> Result<Option<u64>, IndexerError> {
        self.inner.last_indexed_height().await
    }

    async fn query_by_payload(&self, payload: &[u8]) -> Result<Vec<TaggedRecord>, IndexerError> {
        self.inner.query_by_payload(payload).await
    }
}
