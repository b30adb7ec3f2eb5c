//! Error types for the opindex pipeline.

use thiserror::Error;

/// Errors that can occur while crawling and indexing blocks.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The node answered with an error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node could not be reached or answered with something unreadable.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Missing or invalid block height: {0}")]
    InvalidHeight(u64),

    #[error("Invalid block range: {0}")]
    InvalidRange(String),

    /// Generic failure surfaced by the controller once a block's guard mark
    /// has been (re)written. The underlying cause is logged, not carried.
    #[error("Block {height} failed to index all transactions")]
    BlockFailed { height: u64 },

    #[error("{} block(s) remain errored after sweep: {heights:?}", .heights.len())]
    BlocksRemainErrored { heights: Vec<u64> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` for errors raised before any work was attempted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidHeight(_) | Self::InvalidRange(_) | Self::Config(_)
        )
    }

    /// Returns `true` if the error originated at the node boundary.
    pub fn is_node_error(&self) -> bool {
        matches!(self, Self::Rpc { .. } | Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_kinds() {
        assert!(IndexerError::InvalidHeight(0).is_validation());
        assert!(IndexerError::InvalidRange("end < start".into()).is_validation());
        assert!(!IndexerError::Storage("down".into()).is_validation());
        assert!(!IndexerError::BlockFailed { height: 5 }.is_validation());
    }

    #[test]
    fn remaining_errored_message() {
        let err = IndexerError::BlocksRemainErrored { heights: vec![50, 52] };
        assert_eq!(err.to_string(), "2 block(s) remain errored after sweep: [50, 52]");
    }
}
