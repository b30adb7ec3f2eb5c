//! Record store: persists tagged records and errored-block guard marks.
//!
//! A guard mark is written before a block is processed and removed only once
//! the block is fully persisted, so its presence means "not confirmed
//! complete". The resume point is derived from the records themselves: the
//! highest record height that carries no mark.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::IndexerError;
use crate::types::{ErroredBlock, TaggedRecord};

/// Trait for storing tagged records and errored-block marks.
///
/// Implementations include `MemoryRecordStore`, and the `PostgresStore` and
/// `SqliteStore` backends of `opindex-storage`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or update a record keyed on `(payload_long, tx_hash)`.
    async fn upsert_record(&self, record: TaggedRecord) -> Result<TaggedRecord, IndexerError>;

    /// Write (or refresh the timestamp of) the guard mark for `height`.
    async fn mark_errored(&self, height: u64) -> Result<(), IndexerError>;

    /// Remove the guard mark for `height`, if any.
    async fn clear_errored(&self, height: u64) -> Result<(), IndexerError>;

    /// All guard marks, ascending by height.
    async fn list_errored(&self) -> Result<Vec<ErroredBlock>, IndexerError>;

    /// The guard mark for a single height.
    async fn errored_block(&self, height: u64) -> Result<Option<ErroredBlock>, IndexerError>;

    /// Highest record height with no guard mark, or `None` if there is none.
    async fn last_indexed_height(&self) -> Result<Option<u64>, IndexerError>;

    /// Records whose short or long payload equals `payload`.
    async fn query_by_payload(&self, payload: &[u8]) -> Result<Vec<TaggedRecord>, IndexerError>;
}

// ─── In-memory store ──────────────────────────────────────────────────────────

/// In-memory record store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<TaggedRecord>>,
    errored: Mutex<BTreeMap<u64, DateTime<Utc>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, in insertion order.
    pub fn records(&self) -> Result<Vec<TaggedRecord>, IndexerError> {
        Ok(lock(&self.records)?.clone())
    }

    /// Total number of stored records.
    pub fn record_count(&self) -> Result<usize, IndexerError> {
        Ok(lock(&self.records)?.len())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, IndexerError> {
    mutex
        .lock()
        .map_err(|_| IndexerError::Storage("memory store lock poisoned".into()))
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert_record(&self, record: TaggedRecord) -> Result<TaggedRecord, IndexerError> {
        let mut records = lock(&self.records)?;
        match records
            .iter_mut()
            .find(|r| r.payload_long == record.payload_long && r.tx_hash == record.tx_hash)
        {
            Some(existing) => {
                existing.payload_short = record.payload_short.clone();
                existing.block_hash = record.block_hash.clone();
                existing.block_height = record.block_height;
            }
            None => records.push(record.clone()),
        }
        Ok(record)
    }

    async fn mark_errored(&self, height: u64) -> Result<(), IndexerError> {
        lock(&self.errored)?.insert(height, Utc::now());
        Ok(())
    }

    async fn clear_errored(&self, height: u64) -> Result<(), IndexerError> {
        lock(&self.errored)?.remove(&height);
        Ok(())
    }

    async fn list_errored(&self) -> Result<Vec<ErroredBlock>, IndexerError> {
        Ok(lock(&self.errored)?
            .iter()
            .map(|(&block_height, &timestamp)| ErroredBlock { block_height, timestamp })
            .collect())
    }

    async fn errored_block(&self, height: u64) -> Result<Option<ErroredBlock>, IndexerError> {
        Ok(lock(&self.errored)?
            .get(&height)
            .map(|&timestamp| ErroredBlock { block_height: height, timestamp }))
    }

    async fn last_indexed_height(&self) -> Result<Option<u64>, IndexerError> {
        let errored = lock(&self.errored)?;
        Ok(lock(&self.records)?
            .iter()
            .map(|r| r.block_height)
            .filter(|h| !errored.contains_key(h))
            .max())
    }

    async fn query_by_payload(&self, payload: &[u8]) -> Result<Vec<TaggedRecord>, IndexerError> {
        Ok(lock(&self.records)?
            .iter()
            .filter(|r| r.matches_payload(payload))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(payload: &[u8], tx: &str, height: u64) -> TaggedRecord {
        TaggedRecord::new(payload.to_vec(), tx, format!("block{height}"), height)
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = MemoryRecordStore::new();
        store.upsert_record(rec(b"abc", "tx1", 10)).await.unwrap();
        store.upsert_record(rec(b"abc", "tx1", 10)).await.unwrap();
        store.upsert_record(rec(b"def", "tx1", 10)).await.unwrap();
        assert_eq!(store.record_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn same_payload_in_two_transactions() {
        let store = MemoryRecordStore::new();
        store.upsert_record(rec(b"abc", "tx1", 10)).await.unwrap();
        store.upsert_record(rec(b"abc", "tx2", 11)).await.unwrap();

        let found = store.query_by_payload(b"abc").await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(store.query_by_payload(b"zzz").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn errored_marks_roundtrip() {
        let store = MemoryRecordStore::new();
        store.mark_errored(52).await.unwrap();
        store.mark_errored(50).await.unwrap();
        store.mark_errored(52).await.unwrap();

        let heights: Vec<_> = store
            .list_errored()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.block_height)
            .collect();
        assert_eq!(heights, vec![50, 52]);

        store.clear_errored(50).await.unwrap();
        assert!(store.errored_block(50).await.unwrap().is_none());
        assert!(store.errored_block(52).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn last_indexed_height_skips_errored() {
        let store = MemoryRecordStore::new();
        assert_eq!(store.last_indexed_height().await.unwrap(), None);

        store.upsert_record(rec(b"a", "tx1", 100)).await.unwrap();
        store.upsert_record(rec(b"b", "tx2", 101)).await.unwrap();
        assert_eq!(store.last_indexed_height().await.unwrap(), Some(101));

        store.mark_errored(101).await.unwrap();
        assert_eq!(store.last_indexed_height().await.unwrap(), Some(100));
    }
}
