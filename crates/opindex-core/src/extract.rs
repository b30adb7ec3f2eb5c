//! OP_RETURN payload extraction from raw output scripts.
//!
//! Malformed scripts are expected input: every failure mode yields `None`,
//! never an error.

use bitcoin::opcodes::all::{OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4, OP_RETURN};
use bitcoin::script::{Instruction, Script};

use crate::error::IndexerError;

/// Length scripts of 81 or 82 bytes are zero-padded to before decoding.
const PADDED_LEN: usize = 83;

/// Extract the OP_RETURN payload carried by `script`, if any.
///
/// Returns the first data push that could not have been written as a single
/// small-integer opcode. Scripts of 81 or 82 bytes are padded to 83 bytes so
/// that pushes truncated at the old relay limit still decode; any padding that
/// ends up inside the returned push is stripped again.
pub fn extract_payload(script: &[u8]) -> Option<Vec<u8>> {
    if !has_data_carrier_prefix(script) {
        return None;
    }

    let padded = pad_truncated(script);
    let instructions = Script::from_bytes(&padded)
        .instruction_indices()
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    instructions.into_iter().find_map(|(offset, instruction)| match instruction {
        Instruction::PushBytes(push) if !is_minimal_push(push.as_bytes()) => {
            let data = push.as_bytes();
            let end = offset + push_header_len(padded[offset]) + data.len();
            let keep = data.len().saturating_sub(end.saturating_sub(script.len()));
            // a push made entirely of padding carries nothing
            (keep > 0).then(|| data[..keep].to_vec())
        }
        _ => None,
    })
}

/// Normalise a user-supplied hex string to the payload it refers to.
///
/// Accepts either bare payload hex or a full output script; both resolve to
/// the same stored value.
pub fn payload_from_hex(input: &str) -> Result<Vec<u8>, IndexerError> {
    let raw = hex::decode(input.trim())
        .map_err(|e| IndexerError::Other(format!("invalid payload hex: {e}")))?;
    Ok(extract_payload(&raw).unwrap_or(raw))
}

/// Cheap pre-check before decoding: OP_RETURN followed by a non-zero byte.
fn has_data_carrier_prefix(script: &[u8]) -> bool {
    script.len() > 2 && script[0] == OP_RETURN.to_u8() && script[1] > 0
}

fn pad_truncated(script: &[u8]) -> Vec<u8> {
    let mut padded = script.to_vec();
    if matches!(script.len(), 81 | 82) {
        padded.resize(PADDED_LEN, 0);
    }
    padded
}

/// Pushes the encoding could have expressed as `OP_0`, `OP_1`..`OP_16` or `OP_1NEGATE`.
fn is_minimal_push(data: &[u8]) -> bool {
    match data {
        [] => true,
        [b] => (1..=16).contains(b) || *b == 0x81,
        _ => false,
    }
}

fn push_header_len(opcode: u8) -> usize {
    match opcode {
        op if op == OP_PUSHDATA1.to_u8() => 2,
        op if op == OP_PUSHDATA2.to_u8() => 3,
        op if op == OP_PUSHDATA4.to_u8() => 5,
        _ => 1,
    }
}
