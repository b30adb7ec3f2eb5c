//! Indexer configuration and state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Configuration for a crawl controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Crawl floor: the first block height worth indexing.
    pub start_height: u64,
    /// Pause after each transaction that persisted records, per record (milliseconds).
    pub idle_between_txs_ms: u64,
    /// Pause between consecutive heights of a range (milliseconds).
    pub idle_between_blocks_ms: u64,
    /// Idle period between two monitor passes (milliseconds).
    pub monitor_interval_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            start_height: 1,
            idle_between_txs_ms: 1,
            idle_between_blocks_ms: 1,
            monitor_interval_ms: 10_000,
        }
    }
}

impl IndexerConfig {
    /// Reject values the controller cannot run with.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.start_height == 0 {
            return Err(IndexerError::Config("start_height must be at least 1".into()));
        }
        if self.monitor_interval_ms == 0 {
            return Err(IndexerError::Config("monitor_interval_ms must be non-zero".into()));
        }
        Ok(())
    }

    pub fn idle_between_txs(&self) -> Duration {
        Duration::from_millis(self.idle_between_txs_ms)
    }

    pub fn idle_between_blocks(&self) -> Duration {
        Duration::from_millis(self.idle_between_blocks_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Resume point used when nothing has been indexed yet, so that
    /// `start_height` itself is not skipped.
    pub fn fallback_indexed_height(&self) -> u64 {
        self.start_height.saturating_sub(1)
    }
}

/// Runtime state of the crawl controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlState {
    /// Waiting for the next monitor pass or request.
    Idle,
    /// A range, list or monitor pass is running.
    Indexing,
}

impl std::fmt::Display for CrawlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Indexing => write!(f, "indexing"),
        }
    }
}
