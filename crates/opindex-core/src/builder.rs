//! Fluent builder API for creating crawl controllers.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use opindex_core::{CrawlerBuilder, MemoryRecordStore, NodeClient};
//!
//! # fn demo(node: Arc<dyn NodeClient>) -> Result<(), opindex_core::IndexerError> {
//! let controller = CrawlerBuilder::new()
//!     .start_height(600_000)
//!     .monitor_interval_ms(30_000)
//!     .node(node)
//!     .store(Arc::new(MemoryRecordStore::new()))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::config::IndexerConfig;
use crate::crawler::CrawlController;
use crate::error::IndexerError;
use crate::fetcher::NodeClient;
use crate::store::RecordStore;

/// Fluent builder for [`CrawlController`].
#[derive(Default)]
pub struct CrawlerBuilder {
    config: IndexerConfig,
    node: Option<Arc<dyn NodeClient>>,
    store: Option<Arc<dyn RecordStore>>,
}

impl CrawlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: IndexerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the crawl floor.
    pub fn start_height(mut self, height: u64) -> Self {
        self.config.start_height = height;
        self
    }

    /// Pause per persisted record after each transaction.
    pub fn idle_between_txs_ms(mut self, ms: u64) -> Self {
        self.config.idle_between_txs_ms = ms;
        self
    }

    /// Pause between consecutive heights.
    pub fn idle_between_blocks_ms(mut self, ms: u64) -> Self {
        self.config.idle_between_blocks_ms = ms;
        self
    }

    /// Idle period between monitor passes.
    pub fn monitor_interval_ms(mut self, ms: u64) -> Self {
        self.config.monitor_interval_ms = ms;
        self
    }

    pub fn node(mut self, node: Arc<dyn NodeClient>) -> Self {
        self.node = Some(node);
        self
    }

    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the `IndexerConfig` only.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Validate the configuration and build the controller.
    pub fn build(self) -> Result<CrawlController, IndexerError> {
        let node = self
            .node
            .ok_or_else(|| IndexerError::Config("no node client configured".into()))?;
        let store = self
            .store
            .ok_or_else(|| IndexerError::Config("no record store configured".into()))?;
        CrawlController::new(self.config, node, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use crate::test_support::MockNode;

    #[test]
    fn builder_defaults() {
        let cfg = CrawlerBuilder::new().build_config();
        assert_eq!(cfg, IndexerConfig::default());
    }

    #[test]
    fn builder_custom() {
        let cfg = CrawlerBuilder::new()
            .start_height(600_000)
            .idle_between_txs_ms(0)
            .idle_between_blocks_ms(5)
            .monitor_interval_ms(30_000)
            .build_config();

        assert_eq!(cfg.start_height, 600_000);
        assert_eq!(cfg.idle_between_txs_ms, 0);
        assert_eq!(cfg.idle_between_blocks_ms, 5);
        assert_eq!(cfg.monitor_interval_ms, 30_000);
    }

    #[test]
    fn build_requires_collaborators() {
        let err = CrawlerBuilder::new().build().err().unwrap();
        assert!(matches!(err, IndexerError::Config(_)));

        let err = CrawlerBuilder::new()
            .node(Arc::new(MockNode::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, IndexerError::Config(_)));
    }

    #[test]
    fn build_validates_config() {
        let result = CrawlerBuilder::new()
            .start_height(0)
            .node(Arc::new(MockNode::new()))
            .store(Arc::new(MemoryRecordStore::new()))
            .build();
        assert!(result.err().unwrap().is_validation());
    }

    #[test]
    fn build_controller() {
        let ctl = CrawlerBuilder::new()
            .start_height(42)
            .node(Arc::new(MockNode::new()))
            .store(Arc::new(MemoryRecordStore::new()))
            .build()
            .unwrap();
        assert_eq!(ctl.config().start_height, 42);
    }
}
