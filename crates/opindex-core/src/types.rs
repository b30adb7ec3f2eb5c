//! Shared types for the indexing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Maximum length of the legacy "short" payload column.
pub const SHORT_PAYLOAD_LEN: usize = 78;

// ─── TaggedRecord ─────────────────────────────────────────────────────────────

/// One persisted OP_RETURN payload.
///
/// Unique on `(payload_long, tx_hash)`: a transaction carries at most one
/// stored record per distinct payload value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedRecord {
    /// First [`SHORT_PAYLOAD_LEN`] bytes of the payload.
    pub payload_short: Vec<u8>,
    /// The full payload.
    pub payload_long: Vec<u8>,
    /// Owning transaction id.
    pub tx_hash: String,
    /// Hash of the block the transaction was found in.
    pub block_hash: String,
    /// Height of that block.
    pub block_height: u64,
}

impl TaggedRecord {
    /// Build a record, deriving the short form from `payload`.
    pub fn new(
        payload: Vec<u8>,
        tx_hash: impl Into<String>,
        block_hash: impl Into<String>,
        block_height: u64,
    ) -> Self {
        let payload_short = payload[..payload.len().min(SHORT_PAYLOAD_LEN)].to_vec();
        Self {
            payload_short,
            payload_long: payload,
            tx_hash: tx_hash.into(),
            block_hash: block_hash.into(),
            block_height,
        }
    }

    /// Returns `true` if `payload` equals either stored form.
    pub fn matches_payload(&self, payload: &[u8]) -> bool {
        self.payload_long == payload || self.payload_short == payload
    }

    /// Render the record the way the query endpoint returns it.
    pub fn view(&self) -> RecordView {
        RecordView {
            txhash: self.tx_hash.clone(),
            blockhash: self.block_hash.clone(),
            op_return: String::from_utf8_lossy(&self.payload_long).into_owned(),
        }
    }
}

/// Output shape of a payload lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordView {
    pub txhash: String,
    pub blockhash: String,
    /// Payload decoded as UTF-8 (lossy).
    pub op_return: String,
}

// ─── ErroredBlock ─────────────────────────────────────────────────────────────

/// Guard mark for a block whose indexing is not confirmed complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErroredBlock {
    pub block_height: u64,
    /// When the mark was last written.
    pub timestamp: DateTime<Utc>,
}

// ─── BlockRange ───────────────────────────────────────────────────────────────

/// Inclusive, validated range of block heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    /// Create a range; `end` defaults to `start`.
    pub fn new(start: u64, end: Option<u64>) -> Result<Self, IndexerError> {
        if start == 0 {
            return Err(IndexerError::InvalidHeight(start));
        }
        let end = end.unwrap_or(start);
        if end < start {
            return Err(IndexerError::InvalidRange(format!(
                "end block {end} is before start block {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse user-supplied arguments (e.g. from the command line).
    pub fn parse(start: &str, end: Option<&str>) -> Result<Self, IndexerError> {
        let start = parse_height("start", start)?;
        let end = end.map(|e| parse_height("end", e)).transpose()?;
        Self::new(start, end)
    }

    /// Number of heights in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always `false`: a range holds at least one height.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Heights in ascending order.
    pub fn heights(&self) -> impl Iterator<Item = u64> {
        self.start..=self.end
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..={}", self.start, self.end)
        }
    }
}

fn parse_height(which: &str, raw: &str) -> Result<u64, IndexerError> {
    raw.trim().parse::<u64>().map_err(|_| {
        IndexerError::InvalidRange(format!("{which} block must be an integer, got '{raw}'"))
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_payload_is_capped() {
        let rec = TaggedRecord::new(vec![0xab; 80], "tx", "block", 10);
        assert_eq!(rec.payload_short.len(), SHORT_PAYLOAD_LEN);
        assert_eq!(rec.payload_long.len(), 80);

        let small = TaggedRecord::new(b"hello".to_vec(), "tx", "block", 10);
        assert_eq!(small.payload_short, small.payload_long);
    }

    #[test]
    fn matches_either_form() {
        let rec = TaggedRecord::new(vec![0x01; 90], "tx", "block", 1);
        assert!(rec.matches_payload(&[0x01; 90]));
        assert!(rec.matches_payload(&[0x01; 78]));
        assert!(!rec.matches_payload(&[0x01; 79]));
    }

    #[test]
    fn view_decodes_utf8() {
        let rec = TaggedRecord::new(b"hello world".to_vec(), "aa", "bb", 1);
        let view = rec.view();
        assert_eq!(view.op_return, "hello world");
        assert_eq!(view.txhash, "aa");
        assert_eq!(view.blockhash, "bb");
    }

    #[test]
    fn range_rejects_end_before_start() {
        let err = BlockRange::parse("5", Some("3")).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn range_rejects_non_integer() {
        assert!(BlockRange::parse("abc", None).unwrap_err().is_validation());
        assert!(BlockRange::parse("5", Some("x")).unwrap_err().is_validation());
        assert!(BlockRange::parse("-1", None).is_err());
    }

    #[test]
    fn range_defaults_end_to_start() {
        let range = BlockRange::parse("5", None).unwrap();
        assert_eq!(range, BlockRange { start: 5, end: 5 });
        assert_eq!(range.heights().collect::<Vec<_>>(), vec![5]);
        assert_eq!(range.to_string(), "5");
    }

    #[test]
    fn range_rejects_zero_start() {
        assert!(matches!(
            BlockRange::new(0, Some(3)),
            Err(IndexerError::InvalidHeight(0))
        ));
    }

    #[test]
    fn range_heights_ascending() {
        let range = BlockRange::new(101, Some(103)).unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range.heights().collect::<Vec<_>>(), vec![101, 102, 103]);
        assert_eq!(range.to_string(), "101..=103");
    }
}
