//! SQLite record store.
//!
//! # Usage
//! ```rust,no_run
//! use opindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./op_return.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use opindex_core::error::IndexerError;
use opindex_core::store::RecordStore;
use opindex_core::types::{ErroredBlock, TaggedRecord};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tagged_records (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        payload_short BLOB    NOT NULL,
        payload_long  BLOB    NOT NULL,
        tx_hash       TEXT    NOT NULL,
        block_hash    TEXT    NOT NULL,
        block_height  INTEGER NOT NULL,
        UNIQUE (payload_long, tx_hash)
    );",
    "CREATE TABLE IF NOT EXISTS errored_blocks (
        block_height INTEGER PRIMARY KEY,
        errored_at   TEXT    NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_tagged_records_block_height
     ON tagged_records (block_height);",
    "CREATE INDEX IF NOT EXISTS idx_tagged_records_payload_short
     ON tagged_records (payload_short);",
];

/// SQLite-backed [`RecordStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./op_return.db"`) or a full
    /// SQLite URL (`"sqlite:./op_return.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        Self::connect(&url, 4).await
    }

    /// Open an in-memory database. All data is lost when the store is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        // every connection would get its own private memory database
        Self::connect("sqlite::memory:", 1).await
    }

    /// Connect to a `sqlite:` URL and create the schema if needed.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, IndexerError> {
        let max_connections = if url.contains(":memory:") { 1 } else { max_connections };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Enable WAL mode and create tables and indexes if they don't already exist.
    pub async fn migrate(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| IndexerError::Storage(format!("migration failed: {e}")))?;
        }
        debug!("SqliteStore schema initialized");
        Ok(())
    }
}

fn storage_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

fn row_to_record(row: &SqliteRow) -> Result<TaggedRecord, IndexerError> {
    Ok(TaggedRecord {
        payload_short: row.try_get("payload_short").map_err(storage_err)?,
        payload_long: row.try_get("payload_long").map_err(storage_err)?,
        tx_hash: row.try_get("tx_hash").map_err(storage_err)?,
        block_hash: row.try_get("block_hash").map_err(storage_err)?,
        block_height: row.try_get::<i64, _>("block_height").map_err(storage_err)? as u64,
    })
}

fn row_to_errored(row: &SqliteRow) -> Result<ErroredBlock, IndexerError> {
    Ok(ErroredBlock {
        block_height: row.try_get::<i64, _>("block_height").map_err(storage_err)? as u64,
        timestamp: row.try_get::<DateTime<Utc>, _>("errored_at").map_err(storage_err)?,
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert_record(&self, record: TaggedRecord) -> Result<TaggedRecord, IndexerError> {
        sqlx::query(
            "INSERT INTO tagged_records
                (payload_short, payload_long, tx_hash, block_hash, block_height)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (payload_long, tx_hash) DO UPDATE SET
                payload_short = excluded.payload_short,
                block_hash    = excluded.block_hash,
                block_height  = excluded.block_height;",
        )
        .bind(&record.payload_short)
        .bind(&record.payload_long)
        .bind(&record.tx_hash)
        .bind(&record.block_hash)
        .bind(record.block_height as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(record)
    }

    async fn mark_errored(&self, height: u64) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO errored_blocks (block_height, errored_at) VALUES (?, ?)
             ON CONFLICT (block_height) DO UPDATE SET errored_at = excluded.errored_at;",
        )
        .bind(height as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn clear_errored(&self, height: u64) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM errored_blocks WHERE block_height = ?;")
            .bind(height as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn list_errored(&self) -> Result<Vec<ErroredBlock>, IndexerError> {
        let rows = sqlx::query(
            "SELECT block_height, errored_at FROM errored_blocks ORDER BY block_height ASC;",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(row_to_errored).collect()
    }

    async fn errored_block(&self, height: u64) -> Result<Option<ErroredBlock>, IndexerError> {
        let row = sqlx::query(
            "SELECT block_height, errored_at FROM errored_blocks WHERE block_height = ?;",
        )
        .bind(height as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(row_to_errored).transpose()
    }

    async fn last_indexed_height(&self) -> Result<Option<u64>, IndexerError> {
        let row = sqlx::query(
            "SELECT MAX(r.block_height) AS height FROM tagged_records r
             WHERE NOT EXISTS (
                SELECT 1 FROM errored_blocks e WHERE e.block_height = r.block_height
             );",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        let height: Option<i64> = row.try_get("height").map_err(storage_err)?;
        Ok(height.map(|h| h as u64))
    }

    async fn query_by_payload(&self, payload: &[u8]) -> Result<Vec<TaggedRecord>, IndexerError> {
        let rows = sqlx::query(
            "SELECT payload_short, payload_long, tx_hash, block_hash, block_height
             FROM tagged_records
             WHERE payload_long = ? OR payload_short = ?
             ORDER BY block_height ASC, id ASC;",
        )
        .bind(payload)
        .bind(payload)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(row_to_record).collect()
    }
}
