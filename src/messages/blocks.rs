//! Chain tip announcements: BLOCK_SUMMARIES_V2 and HEIGHT_V2.

use serde::Serialize;

use super::reader::{require_min, PayloadReader, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use crate::error::DecodeError;

/// Signature + minter key + online count + timestamp + tx count + reference
pub const BLOCK_SUMMARY_LEN: usize = SIGNATURE_LENGTH + PUBLIC_KEY_LENGTH + 4 + 8 + 4 + SIGNATURE_LENGTH;

/// Height + signature + timestamp + minter key
pub const HEIGHT_V2_LEN: usize = 4 + SIGNATURE_LENGTH + 8 + PUBLIC_KEY_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub height: i32,
    pub signature: String,
    pub minter_public_key: String,
    pub online_accounts_count: i32,
    pub timestamp: i64,
    pub transaction_count: i32,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTip {
    pub height: i32,
    pub signature: String,
    pub timestamp: i64,
    pub minter_public_key: String,
}

/// An empty payload carries no summaries. Otherwise a first height is followed
/// by consecutive fixed-width summaries.
pub fn decode_block_summaries_v2(payload: &[u8]) -> Result<Vec<BlockSummary>, DecodeError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    require_min("BLOCK_SUMMARIES_V2", payload, 4)?;

    let mut r = PayloadReader::new(payload);
    let first_height = r.read_i32()?;

    let leftover = r.remaining() % BLOCK_SUMMARY_LEN;
    if leftover != 0 {
        return Err(DecodeError::TrailingBytes(leftover));
    }

    let count = r.remaining() / BLOCK_SUMMARY_LEN;
    let mut summaries = Vec::with_capacity(count);
    for index in 0..count {
        summaries.push(BlockSummary {
            height: first_height.wrapping_add(index as i32),
            signature: r.read_signature()?,
            minter_public_key: r.read_public_key()?,
            online_accounts_count: r.read_i32()?,
            timestamp: r.read_i64()?,
            transaction_count: r.read_i32()?,
            reference: r.read_signature()?,
        });
    }
    Ok(summaries)
}

pub fn decode_height_v2(payload: &[u8]) -> Result<ChainTip, DecodeError> {
    require_min("HEIGHT_V2", payload, HEIGHT_V2_LEN)?;
    let mut r = PayloadReader::new(payload);

    Ok(ChainTip {
        height: r.read_i32()?,
        signature: r.read_signature()?,
        timestamp: r.read_i64()?,
        minter_public_key: r.read_public_key()?,
    })
}

/// Latest (height, timestamp) among a batch of summaries
pub fn latest_tip(summaries: &[BlockSummary]) -> Option<(i32, i64)> {
    summaries
        .iter()
        .max_by_key(|s| (s.height, s.timestamp))
        .map(|s| (s.height, s.timestamp))
}
