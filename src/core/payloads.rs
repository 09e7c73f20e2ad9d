//! Builders for outbound payloads: handshake messages and GET_* requests.
//!
//! Integers are big-endian, request booleans are one byte (0/1), strings are
//! length-prefixed UTF-8 and optional timestamps use 0 for "absent".

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};

/// Raw address length (version byte + RIPEMD-160 + checksum)
pub const ADDRESS_LENGTH: usize = 25;
pub const PUBLIC_KEY_LENGTH: usize = 32;
pub const CHALLENGE_LENGTH: usize = 32;

/// Response hash length (SHA-256)
pub const RESPONSE_HASH_LENGTH: usize = 32;

/// Encoding requested for chat payload fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Encoding {
    Base58 = 0,
    Base64 = 1,
}

/// Decode a Base58 address and check its length.
pub fn address_bytes(address: &str) -> Result<[u8; ADDRESS_LENGTH]> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|e| ProtocolError::InvalidAddress(format!("{address}: {e}")))?;

    decoded.as_slice().try_into().map_err(|_| {
        ProtocolError::InvalidAddress(format!(
            "Expected {ADDRESS_LENGTH} bytes, got {}",
            decoded.len()
        ))
    })
}

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

fn address_only(address: &str) -> Result<Bytes> {
    Ok(Bytes::copy_from_slice(&address_bytes(address)?))
}

fn group_id_only(group_id: i32) -> Bytes {
    Bytes::copy_from_slice(&group_id.to_be_bytes())
}

fn paging(buf: &mut BytesMut, limit: u32, offset: u32, reverse: bool) {
    buf.put_u32(limit);
    buf.put_u32(offset);
    put_bool(buf, reverse);
}

/// HELLO: timestamp(8) + version + node label
pub fn hello(timestamp: i64, version: &str, node_label: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + version.len() + node_label.len());
    buf.put_i64(timestamp);
    put_string(&mut buf, version);
    put_string(&mut buf, node_label);
    buf.freeze()
}

/// CHALLENGE: our Ed25519 public key + random challenge
pub fn challenge(public_key: &[u8; PUBLIC_KEY_LENGTH], challenge: &[u8; CHALLENGE_LENGTH]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PUBLIC_KEY_LENGTH + CHALLENGE_LENGTH);
    buf.put_slice(public_key);
    buf.put_slice(challenge);
    buf.freeze()
}

/// RESPONSE: proof-of-work nonce + response hash
pub fn response(nonce: u32, hash: &[u8; RESPONSE_HASH_LENGTH]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + RESPONSE_HASH_LENGTH);
    buf.put_u32(nonce);
    buf.put_slice(hash);
    buf.freeze()
}

/// Single placeholder byte used by PING and GET_PEERS
pub fn empty_marker() -> Bytes {
    Bytes::from_static(&[0x00])
}

pub fn get_account(address: &str) -> Result<Bytes> {
    address_only(address)
}

pub fn get_account_balance(address: &str, asset_id: u64) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(ADDRESS_LENGTH + 8);
    buf.put_slice(&address_bytes(address)?);
    buf.put_u64(asset_id);
    Ok(buf.freeze())
}

pub fn get_active_chat(address: &str, encoding: Encoding, has_chat_reference: bool) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(ADDRESS_LENGTH + 2);
    buf.put_slice(&address_bytes(address)?);
    buf.put_u8(encoding as u8);
    put_bool(&mut buf, has_chat_reference);
    Ok(buf.freeze())
}

/// GET_CHAT_MESSAGES for a group conversation or a direct conversation
pub fn get_chat_messages(
    tx_group_id: Option<i32>,
    involving: Option<(&str, &str)>,
    before: Option<i64>,
    limit: u32,
) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    buf.put_i64(before.unwrap_or(0));
    buf.put_i32(tx_group_id.unwrap_or(0));
    match involving {
        Some((a, b)) => {
            put_bool(&mut buf, true);
            buf.put_slice(&address_bytes(a)?);
            buf.put_slice(&address_bytes(b)?);
        }
        None => put_bool(&mut buf, false),
    }
    buf.put_u32(limit);
    Ok(buf.freeze())
}

pub fn get_names(limit: u32, offset: u32, reverse: bool, after: Option<i64>) -> Bytes {
    let mut buf = BytesMut::with_capacity(17);
    paging(&mut buf, limit, offset, reverse);
    buf.put_i64(after.unwrap_or(0));
    buf.freeze()
}

pub fn get_account_names(address: &str) -> Result<Bytes> {
    address_only(address)
}

pub fn get_name(name: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + name.len());
    put_string(&mut buf, name);
    buf.freeze()
}

pub fn get_primary_name(address: &str) -> Result<Bytes> {
    address_only(address)
}

pub fn get_groups(limit: u32, offset: u32, reverse: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(9);
    paging(&mut buf, limit, offset, reverse);
    buf.freeze()
}

pub fn get_group(group_id: i32) -> Bytes {
    group_id_only(group_id)
}

pub fn get_account_groups(address: &str) -> Result<Bytes> {
    address_only(address)
}

pub fn get_owner_groups(address: &str) -> Result<Bytes> {
    address_only(address)
}

pub fn get_group_members(
    group_id: i32,
    only_admins: bool,
    limit: u32,
    offset: u32,
    reverse: bool,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(14);
    buf.put_i32(group_id);
    put_bool(&mut buf, only_admins);
    paging(&mut buf, limit, offset, reverse);
    buf.freeze()
}

pub fn get_group_bans(group_id: i32) -> Bytes {
    group_id_only(group_id)
}

pub fn get_group_invites(group_id: i32) -> Bytes {
    group_id_only(group_id)
}

pub fn get_address_group_invites(address: &str) -> Result<Bytes> {
    address_only(address)
}

pub fn get_group_join_requests(group_id: i32) -> Bytes {
    group_id_only(group_id)
}

pub fn get_last_reference(address: &str) -> Result<Bytes> {
    address_only(address)
}

pub fn get_public_key(address: &str) -> Result<Bytes> {
    address_only(address)
}

pub fn get_unit_fee(tx_type: &str, timestamp: Option<i64>) -> Bytes {
    let mut buf = BytesMut::with_capacity(12 + tx_type.len());
    put_string(&mut buf, tx_type);
    buf.put_i64(timestamp.unwrap_or(0));
    buf.freeze()
}

pub fn get_poll(poll_name: &str) -> Bytes {
    get_name(poll_name)
}

/// PROCESS_TRANSACTION carries the raw signed transaction bytes.
pub fn process_transaction(signed_base58: &str) -> Result<Bytes> {
    let raw = bs58::decode(signed_base58)
        .into_vec()
        .map_err(|e| ProtocolError::Custom(format!("Invalid signed transaction: {e}")))?;
    let mut buf = BytesMut::with_capacity(4 + raw.len());
    buf.put_u32(raw.len() as u32);
    buf.put_slice(&raw);
    Ok(buf.freeze())
}
