//! Fee quotes, transaction submission results and polls.

use serde::Serialize;

use super::reader::{require_min, Amount, PayloadReader, ADDRESS_LENGTH, PUBLIC_KEY_LENGTH};
use crate::error::DecodeError;

const POLL_MIN_LEN: usize = 4 + 4 + ADDRESS_LENGTH + PUBLIC_KEY_LENGTH + 8 + 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTransactionResponse {
    pub success: bool,
    /// Validation result code reported by the node
    pub code: i32,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub poll_name: String,
    pub description: Option<String>,
    pub owner: String,
    pub creator_public_key: String,
    pub published: i64,
    pub poll_options: Vec<String>,
}

pub fn decode_unit_fee(payload: &[u8]) -> Result<Amount, DecodeError> {
    require_min("UNIT_FEE", payload, 8)?;
    PayloadReader::new(payload).read_amount()
}

pub fn decode_process_transaction_response(
    payload: &[u8],
) -> Result<ProcessTransactionResponse, DecodeError> {
    require_min("PROCESS_TRANSACTION_RESPONSE", payload, 12)?;
    let mut r = PayloadReader::new(payload);

    Ok(ProcessTransactionResponse {
        success: r.read_flag_or_false()?,
        code: r.read_i32()?,
        message: r.read_nullable_string()?,
    })
}

pub fn decode_polls(payload: &[u8]) -> Result<Vec<Poll>, DecodeError> {
    require_min("POLLS", payload, 4)?;
    PayloadReader::new(payload).read_list(POLL_MIN_LEN, |r| {
        Ok(Poll {
            poll_name: r.read_string()?,
            description: r.read_nullable_string()?,
            owner: r.read_address()?,
            creator_public_key: r.read_public_key()?,
            published: r.read_i64()?,
            poll_options: r.read_list(4, |r| r.read_string())?,
        })
    })
}
