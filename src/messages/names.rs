use serde::Serialize;

use super::reader::{require_min, Amount, PayloadReader, ADDRESS_LENGTH, SIGNATURE_LENGTH};
use crate::error::DecodeError;

/// Smallest encoding of one name record
const NAME_MIN_LEN: usize = 4 + 4 + ADDRESS_LENGTH + 4 + 8 + 8 + 4 + 8 + SIGNATURE_LENGTH + 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameRecord {
    pub name: String,
    pub reduced_name: String,
    pub owner: String,
    pub data: Option<String>,
    pub registered: i64,
    pub updated: Option<i64>,
    pub is_for_sale: bool,
    /// Present on the wire even when the name is not for sale
    pub sale_price: Amount,
    pub reference: String,
    pub creation_group_id: i32,
}

fn read_name(r: &mut PayloadReader<'_>) -> Result<NameRecord, DecodeError> {
    Ok(NameRecord {
        name: r.read_string()?,
        reduced_name: r.read_string()?,
        owner: r.read_address()?,
        data: r.read_nullable_string()?,
        registered: r.read_i64()?,
        updated: r.read_optional_timestamp()?,
        is_for_sale: r.read_flag_or_false()?,
        sale_price: r.read_amount()?,
        reference: r.read_signature()?,
        creation_group_id: r.read_i32()?,
    })
}

/// NAMES: shared by name lookups, names-by-owner and name listings
pub fn decode_names(payload: &[u8]) -> Result<Vec<NameRecord>, DecodeError> {
    require_min("NAMES", payload, 4)?;
    PayloadReader::new(payload).read_list(NAME_MIN_LEN, read_name)
}

pub fn decode_primary_name(payload: &[u8]) -> Result<Option<String>, DecodeError> {
    require_min("PRIMARY_NAME", payload, 4)?;
    PayloadReader::new(payload).read_nullable_string()
}
