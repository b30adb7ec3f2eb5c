//! Block processor: turns one block height into persisted tagged records.
//!
//! Transactions are walked strictly in node order and outputs in index order.
//! Any node or store failure aborts the whole block; partial persistence is
//! never reported as success.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::IndexerError;
use crate::extract::extract_payload;
use crate::fetcher::{BlockFetcher, RawTransaction};
use crate::store::RecordStore;
use crate::types::TaggedRecord;

/// Outcome of processing a single block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReport {
    pub height: u64,
    pub block_hash: String,
    /// Number of records upserted for the block (0 is valid).
    pub total_indexed: usize,
}

/// Fetches a block and persists every OP_RETURN payload it carries.
#[derive(Clone)]
pub struct BlockProcessor {
    fetcher: BlockFetcher,
    store: Arc<dyn RecordStore>,
    idle_between_txs: Duration,
}

impl BlockProcessor {
    pub fn new(fetcher: BlockFetcher, store: Arc<dyn RecordStore>, idle_between_txs: Duration) -> Self {
        Self {
            fetcher,
            store,
            idle_between_txs,
        }
    }

    /// Index all payloads of the block at `height`.
    pub async fn process_block(&self, height: u64) -> Result<BlockReport, IndexerError> {
        let block = self.fetcher.block_at(height).await.map_err(|e| {
            error!(height, error = %e, "Failed to fetch block");
            e
        })?;

        let mut total_indexed = 0;
        for tx in &block.txs {
            let saved = self
                .index_transaction(tx, &block.hash, height)
                .await
                .map_err(|e| {
                    error!(height, txid = %tx.txid, error = %e, "Failed indexing transaction");
                    e
                })?;
            total_indexed += saved;

            let pause = self.pause_after(saved);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        info!(height, total_indexed, "Finished block");
        Ok(BlockReport {
            height,
            block_hash: block.hash,
            total_indexed,
        })
    }

    /// Idle time after a transaction that saved `saved` records.
    fn pause_after(&self, saved: usize) -> Duration {
        let saved = u32::try_from(saved).unwrap_or(u32::MAX);
        self.idle_between_txs.saturating_mul(saved)
    }

    async fn index_transaction(
        &self,
        tx: &RawTransaction,
        block_hash: &str,
        height: u64,
    ) -> Result<usize, IndexerError> {
        let mut saved = 0;
        for payload in transaction_payloads(tx) {
            let record = self
                .store
                .upsert_record(TaggedRecord::new(payload, &tx.txid, block_hash, height))
                .await?;
            debug!(
                height,
                txhash = %record.tx_hash.get(..8).unwrap_or(&record.tx_hash),
                op_return = %hex::encode(&record.payload_short),
                "Indexed record"
            );
            saved += 1;
        }
        Ok(saved)
    }
}

/// Payloads carried by `tx`, in output index order.
pub fn transaction_payloads(tx: &RawTransaction) -> Vec<Vec<u8>> {
    tx.vout
        .iter()
        .filter_map(|out| out.script_bytes())
        .filter_map(|script| extract_payload(&script))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use crate::test_support::{data_tx, plain_tx, FlakyStore, MockNode};

    fn processor(node: MockNode, store: Arc<dyn RecordStore>) -> BlockProcessor {
        BlockProcessor::new(BlockFetcher::new(Arc::new(node)), store, Duration::ZERO)
    }

    #[test]
    fn payloads_follow_output_order() {
        let tx = data_tx("aa", &[b"first", b"second"]);
        assert_eq!(
            transaction_payloads(&tx),
            vec![b"first".to_vec(), b"second".to_vec()]
        );
        assert!(transaction_payloads(&plain_tx("bb")).is_empty());
    }

    #[tokio::test]
    async fn indexes_all_payloads_of_block() {
        let node = MockNode::new();
        node.add_block(100, vec![data_tx("tx1", &[b"hello"]), plain_tx("tx2"), data_tx("tx3", &[b"a", b"b"])]);
        let store = Arc::new(MemoryRecordStore::new());

        let report = processor(node, store.clone()).process_block(100).await.unwrap();
        assert_eq!(report.total_indexed, 3);
        assert_eq!(report.block_hash, MockNode::hash_for(100));

        let records = store.records().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.block_height == 100));
        assert_eq!(records[0].tx_hash, "tx1");
        assert_eq!(records[2].payload_long, b"b".to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_after_each_saved_record() {
        let idle = Duration::from_millis(250);
        let node = MockNode::new();
        node.add_block(
            20,
            vec![plain_tx("coinbase"), data_tx("tx1", &[b"a"]), data_tx("tx2", &[b"b", b"c"])],
        );
        node.add_block(21, vec![plain_tx("coinbase"), plain_tx("tx3")]);
        let store = Arc::new(MemoryRecordStore::new());
        let p = BlockProcessor::new(BlockFetcher::new(Arc::new(node)), store, idle);

        let started = tokio::time::Instant::now();
        let report = p.process_block(20).await.unwrap();
        assert_eq!(report.total_indexed, 3);
        assert_eq!(started.elapsed(), idle * 3);

        let started = tokio::time::Instant::now();
        p.process_block(21).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn pause_saturates_instead_of_overflowing() {
        let p = BlockProcessor::new(
            BlockFetcher::new(Arc::new(MockNode::new())),
            Arc::new(MemoryRecordStore::new()),
            Duration::from_millis(u64::MAX),
        );
        assert_eq!(p.pause_after(0), Duration::ZERO);
        assert_eq!(p.pause_after(2), Duration::MAX);
        assert_eq!(p.pause_after(usize::MAX), Duration::MAX);
    }

    #[tokio::test]
    async fn empty_block_is_success() {
        let node = MockNode::new();
        node.add_block(7, vec![plain_tx("coinbase")]);
        let store = Arc::new(MemoryRecordStore::new());
        let report = processor(node, store).process_block(7).await.unwrap();
        assert_eq!(report.total_indexed, 0);
    }

    #[tokio::test]
    async fn reprocessing_is_idempotent() {
        let node = MockNode::new();
        node.add_block(5, vec![data_tx("tx1", &[b"x"]), data_tx("tx2", &[b"y"])]);
        let store = Arc::new(MemoryRecordStore::new());
        let p = processor(node, store.clone());

        p.process_block(5).await.unwrap();
        let first = store.records().unwrap();
        p.process_block(5).await.unwrap();
        assert_eq!(store.records().unwrap(), first);
    }

    #[tokio::test]
    async fn node_failure_propagates() {
        let node = MockNode::new();
        node.add_block(9, vec![data_tx("tx1", &[b"x"])]);
        node.fail_height(9, 1);
        let store = Arc::new(MemoryRecordStore::new());

        let err = processor(node, store.clone()).process_block(9).await.unwrap_err();
        assert!(err.is_node_error());
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn store_failure_aborts_block() {
        let node = MockNode::new();
        node.add_block(3, vec![data_tx("tx1", &[b"x"]), data_tx("tx2", &[b"y"])]);
        let store = Arc::new(FlakyStore::new());
        store.fail_upserts(true);

        let err = processor(node, store).process_block(3).await.unwrap_err();
        assert!(matches!(err, IndexerError::Storage(_)));
    }

    #[tokio::test]
    async fn unknown_height_fails() {
        let store = Arc::new(MemoryRecordStore::new());
        assert!(processor(MockNode::new(), store).process_block(42).await.is_err());
    }
}
