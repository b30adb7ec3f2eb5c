//! opindex-core: OP_RETURN payload indexing engine.
//!
//! # Architecture
//!
//! ```text
//! CrawlerBuilder → CrawlController
//!                      ├── monitor loop   (catch-up pass + errored sweep, then idle)
//!                      ├── errored marks  (crash-safe guard around every block)
//!                      └── BlockProcessor
//!                              ├── BlockFetcher → NodeClient  (JSON-RPC node)
//!                              ├── extract_payload            (OP_RETURN scripts)
//!                              └── RecordStore                (memory / SQLite / Postgres)
//! ```

pub mod builder;
pub mod config;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod processor;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

pub use builder::CrawlerBuilder;
pub use config::{CrawlState, IndexerConfig};
pub use crawler::{BlockOutcome, CrawlController, HeightOutcome, PassReport, RangeReport};
pub use error::IndexerError;
pub use extract::{extract_payload, payload_from_hex};
pub use fetcher::{BlockFetcher, ChainInfo, NodeClient, RawBlock, RawTransaction};
pub use processor::{BlockProcessor, BlockReport};
pub use store::{MemoryRecordStore, RecordStore};
pub use types::{BlockRange, ErroredBlock, RecordView, TaggedRecord};
