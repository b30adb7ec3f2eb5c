//! opindex-storage: database backends for the OpIndex record store.
//!
//! Backends:
//! - `postgres`: PostgreSQL via `sqlx` (production)
//! - `sqlite`: SQLite via `sqlx` (embedded, single-file persistence)
//!
//! The in-memory store lives in `opindex-core` as `MemoryRecordStore`.

pub mod config;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use opindex_core::{IndexerError, RecordStore};
use tracing::info;

pub use config::{StoreBackend, StoreConfig};

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Connect to the configured backend, creating the schema if needed.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, IndexerError> {
    info!(backend = %config.backend, url = %config.redacted_url(), "Opening record store");
    match config.backend {
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => Ok(Arc::new(
            PostgresStore::connect_with(config.pg_connect_options(), config.max_connections)
                .await?,
        )),
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => Ok(Arc::new(
            SqliteStore::connect(&config.sqlite_url(), config.max_connections).await?,
        )),
        #[allow(unreachable_patterns)]
        other => Err(IndexerError::Config(format!(
            "backend '{other}' not compiled in"
        ))),
    }
}
