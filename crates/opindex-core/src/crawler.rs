//! Crawl controller: crash-safe block indexing, errored-block sweep and the
//! monitor loop.
//!
//! # Crash safety
//! Every block is guarded by an errored mark written *before* any work and
//! cleared only after the block is fully persisted. A process that dies in
//! between leaves the mark behind, and the next sweep picks the block up.
//!
//! # Monitor pass
//! 1. Read the indexed height and the node's chain height.
//! 2. Index the gap up to the chain height, if any.
//! 3. Sweep the errored marks.
//!
//! [`CrawlController::run_monitor`] repeats passes with an idle interval in
//! between until its cancellation token fires.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CrawlState, IndexerConfig};
use crate::error::IndexerError;
use crate::fetcher::{BlockFetcher, NodeClient};
use crate::processor::{BlockProcessor, BlockReport};
use crate::store::RecordStore;
use crate::types::BlockRange;

// ─── Reports ──────────────────────────────────────────────────────────────────

/// What happened to one height of a range or list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockOutcome {
    Indexed { total_indexed: usize },
    /// The first attempt failed, the immediate retry succeeded.
    IndexedOnRetry { total_indexed: usize },
    /// Both attempts failed; the errored mark is left for the sweep.
    Failed,
}

impl BlockOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightOutcome {
    pub height: u64,
    pub outcome: BlockOutcome,
}

/// Per-height results of a range or list operation, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeReport {
    pub outcomes: Vec<HeightOutcome>,
}

impl RangeReport {
    /// Number of heights that ended up indexed.
    pub fn indexed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_success()).count()
    }

    /// Heights left marked as errored.
    pub fn failed_heights(&self) -> Vec<u64> {
        self.outcomes
            .iter()
            .filter(|o| !o.outcome.is_success())
            .map(|o| o.height)
            .collect()
    }

    /// Records persisted across all successful heights.
    pub fn total_records(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.outcome {
                BlockOutcome::Indexed { total_indexed }
                | BlockOutcome::IndexedOnRetry { total_indexed } => total_indexed,
                BlockOutcome::Failed => 0,
            })
            .sum()
    }

    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| o.outcome.is_success())
    }
}

/// Summary of one monitor pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// Indexed height observed at the start of the pass.
    pub indexed_height: u64,
    pub chain_height: u64,
    /// Catch-up range, `None` when already caught up.
    pub catch_up: Option<RangeReport>,
    /// Errored-block sweep.
    pub sweep: RangeReport,
    /// Marks still present after the sweep.
    pub remaining_errored: Vec<u64>,
}

// ─── Status ───────────────────────────────────────────────────────────────────

/// Flips the status to `Indexing` for its lifetime.
struct IndexingGuard<'a> {
    status: &'a watch::Sender<CrawlState>,
}

impl<'a> IndexingGuard<'a> {
    fn enter(status: &'a watch::Sender<CrawlState>) -> Self {
        status.send_replace(CrawlState::Indexing);
        Self { status }
    }
}

impl Drop for IndexingGuard<'_> {
    fn drop(&mut self) {
        self.status.send_replace(CrawlState::Idle);
    }
}

// ─── CrawlController ──────────────────────────────────────────────────────────

/// Drives block processing against a node and a record store.
///
/// All work is sequential: one height at a time, ascending within a range.
/// Concurrent calls touching the same height must be avoided by the caller.
pub struct CrawlController {
    config: IndexerConfig,
    fetcher: BlockFetcher,
    processor: BlockProcessor,
    store: Arc<dyn RecordStore>,
    status: watch::Sender<CrawlState>,
}

impl CrawlController {
    /// Create a controller, validating `config` first.
    pub fn new(
        config: IndexerConfig,
        node: Arc<dyn NodeClient>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        let fetcher = BlockFetcher::new(node);
        let processor =
            BlockProcessor::new(fetcher.clone(), store.clone(), config.idle_between_txs());
        let (status, _) = watch::channel(CrawlState::Idle);
        Ok(Self {
            config,
            fetcher,
            processor,
            store,
            status,
        })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &BlockFetcher {
        &self.fetcher
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Current crawl state.
    pub fn status(&self) -> CrawlState {
        *self.status.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe_status(&self) -> watch::Receiver<CrawlState> {
        self.status.subscribe()
    }

    /// Highest fully indexed height, or `start_height - 1` if nothing is indexed.
    pub async fn indexed_height(&self) -> Result<u64, IndexerError> {
        Ok(self
            .store
            .last_indexed_height()
            .await?
            .unwrap_or_else(|| self.config.fallback_indexed_height()))
    }

    /// Current chain height reported by the node.
    pub async fn chain_height(&self) -> Result<u64, IndexerError> {
        self.fetcher.chain_height().await
    }

    /// Index one block under the errored-mark guard.
    ///
    /// On any failure the mark is rewritten and [`IndexerError::BlockFailed`]
    /// is returned; the underlying cause is only logged.
    pub async fn index_single_block(&self, height: u64) -> Result<BlockReport, IndexerError> {
        if height == 0 {
            return Err(IndexerError::InvalidHeight(height));
        }

        if let Err(e) = self.store.mark_errored(height).await {
            warn!(height, error = %e, "Failed to write errored mark");
            return Err(IndexerError::BlockFailed { height });
        }
        info!(height, "Indexing block");

        let result = match self.processor.process_block(height).await {
            Ok(report) => self.store.clear_errored(height).await.map(|()| report),
            Err(e) => Err(e),
        };

        match result {
            Ok(report) => Ok(report),
            Err(cause) => {
                warn!(height, error = %cause, "Block failed to index");
                if let Err(e) = self.store.mark_errored(height).await {
                    error!(height, error = %e, "Failed to refresh errored mark");
                }
                Err(IndexerError::BlockFailed { height })
            }
        }
    }

    /// Index every height of `range`, ascending.
    pub async fn index_range(&self, range: BlockRange) -> Result<RangeReport, IndexerError> {
        let _guard = IndexingGuard::enter(&self.status);
        info!(start = range.start, end = range.end, "Indexing range");
        let heights: Vec<u64> = range.heights().collect();
        Ok(self.index_heights(&heights).await)
    }

    /// Index an explicit list of heights, in the given order.
    pub async fn index_blocks(&self, heights: &[u64]) -> Result<RangeReport, IndexerError> {
        if heights.contains(&0) {
            return Err(IndexerError::InvalidHeight(0));
        }
        let _guard = IndexingGuard::enter(&self.status);
        Ok(self.index_heights(heights).await)
    }

    /// Re-attempt every errored block, ascending.
    ///
    /// Fails with [`IndexerError::BlocksRemainErrored`] if marks are still
    /// present after the pass.
    pub async fn index_errored_blocks(&self) -> Result<RangeReport, IndexerError> {
        let report = self.sweep_errored().await?;
        let remaining = self.errored_heights().await?;
        if remaining.is_empty() {
            Ok(report)
        } else {
            Err(IndexerError::BlocksRemainErrored { heights: remaining })
        }
    }

    /// Run a single monitor pass.
    ///
    /// `start_from` overrides the computed resume point. Failures of single
    /// blocks are recorded in the report; only store or node errors while
    /// reading heights fail the pass.
    pub async fn monitor_pass(&self, start_from: Option<u64>) -> Result<PassReport, IndexerError> {
        let (indexed_height, chain_height) =
            tokio::try_join!(self.indexed_height(), self.chain_height())?;

        let from = start_from
            .unwrap_or_else(|| self.config.start_height.max(indexed_height + 1))
            .max(1);

        let catch_up = if from > chain_height {
            debug!(indexed_height, chain_height, "Already caught up");
            None
        } else {
            let range = BlockRange::new(from, Some(chain_height))?;
            Some(self.index_range(range).await?)
        };

        let sweep = self.sweep_errored().await?;
        let remaining_errored = self.errored_heights().await?;
        if !remaining_errored.is_empty() {
            error!(
                count = remaining_errored.len(),
                heights = ?remaining_errored,
                "Blocks remain errored after sweep"
            );
        }

        Ok(PassReport {
            indexed_height,
            chain_height,
            catch_up,
            sweep,
            remaining_errored,
        })
    }

    /// Run monitor passes until `shutdown` is cancelled.
    ///
    /// `start_from` applies to the first pass only. A failed pass is logged
    /// and the loop carries on.
    pub async fn run_monitor(&self, start_from: Option<u64>, shutdown: CancellationToken) {
        let mut start_from = start_from;
        info!(
            interval_ms = self.config.monitor_interval_ms,
            "Starting monitor loop"
        );

        loop {
            match self.monitor_pass(start_from.take()).await {
                Ok(report) => info!(
                    chain_height = report.chain_height,
                    indexed = report.catch_up.as_ref().map_or(0, RangeReport::indexed),
                    swept = report.sweep.indexed(),
                    remaining_errored = report.remaining_errored.len(),
                    "Monitor pass complete"
                ),
                Err(e) => error!(error = %e, "Monitor pass failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.monitor_interval()) => {}
            }
        }

        info!("Monitor loop stopped");
    }

    /// Run the monitor loop as a background task.
    pub fn spawn_monitor(
        self: Arc<Self>,
        start_from: Option<u64>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_monitor(start_from, shutdown).await })
    }

    // ─── internals ───────────────────────────────────────────────────────────

    async fn errored_heights(&self) -> Result<Vec<u64>, IndexerError> {
        Ok(self
            .store
            .list_errored()
            .await?
            .into_iter()
            .map(|b| b.block_height)
            .collect())
    }

    async fn sweep_errored(&self) -> Result<RangeReport, IndexerError> {
        let heights = self.errored_heights().await?;
        if heights.is_empty() {
            return Ok(RangeReport::default());
        }
        info!(count = heights.len(), "Re-indexing errored blocks");
        let _guard = IndexingGuard::enter(&self.status);
        Ok(self.index_heights(&heights).await)
    }

    /// One attempt plus one immediate retry per height; never aborts early.
    async fn index_heights(&self, heights: &[u64]) -> RangeReport {
        let idle = self.config.idle_between_blocks();
        let mut report = RangeReport::default();

        for (i, &height) in heights.iter().enumerate() {
            if i > 0 && !idle.is_zero() {
                tokio::time::sleep(idle).await;
            }

            let outcome = match self.index_single_block(height).await {
                Ok(r) => BlockOutcome::Indexed {
                    total_indexed: r.total_indexed,
                },
                Err(_) => {
                    warn!(height, "Retrying block");
                    match self.index_single_block(height).await {
                        Ok(r) => BlockOutcome::IndexedOnRetry {
                            total_indexed: r.total_indexed,
                        },
                        Err(e) => {
                            error!(height, error = %e, "Block left for errored sweep");
                            BlockOutcome::Failed
                        }
                    }
                }
            };
            report.outcomes.push(HeightOutcome { height, outcome });
        }

        report
    }
}
