use serde::Serialize;

use super::reader::{
    require_min, Amount, PayloadReader, ADDRESS_LENGTH, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH,
};
use crate::error::DecodeError;

/// Address + reference + public key + six i32 fields
pub const ACCOUNT_MIN_LEN: usize = ADDRESS_LENGTH + SIGNATURE_LENGTH + PUBLIC_KEY_LENGTH + 6 * 4;

/// Address + asset id + balance
pub const ACCOUNT_BALANCE_MIN_LEN: usize = ADDRESS_LENGTH + 8 + 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    pub reference: String,
    pub public_key: String,
    pub default_group_id: i32,
    pub flags: i32,
    pub level: i32,
    pub blocks_minted: i32,
    pub blocks_minted_adjustment: i32,
    pub blocks_minted_penalty: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub address: String,
    pub asset_id: u64,
    pub balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyRecord {
    pub address: String,
    /// Absent when the account has never transacted
    pub public_key: Option<String>,
}

pub fn decode_account(payload: &[u8]) -> Result<Account, DecodeError> {
    require_min("ACCOUNT", payload, ACCOUNT_MIN_LEN)?;
    let mut r = PayloadReader::new(payload);

    Ok(Account {
        address: r.read_address()?,
        reference: r.read_signature()?,
        public_key: r.read_public_key()?,
        default_group_id: r.read_i32()?,
        flags: r.read_i32()?,
        level: r.read_i32()?,
        blocks_minted: r.read_i32()?,
        blocks_minted_adjustment: r.read_i32()?,
        blocks_minted_penalty: r.read_i32()?,
    })
}

pub fn decode_account_balance(payload: &[u8]) -> Result<AccountBalance, DecodeError> {
    require_min("ACCOUNT_BALANCE", payload, ACCOUNT_BALANCE_MIN_LEN)?;
    let mut r = PayloadReader::new(payload);

    Ok(AccountBalance {
        address: r.read_address()?,
        asset_id: r.read_u64()?,
        balance: r.read_amount()?,
    })
}

/// LAST_REFERENCE: nullable reference bytes
pub fn decode_last_reference(payload: &[u8]) -> Result<Option<String>, DecodeError> {
    require_min("LAST_REFERENCE", payload, 4)?;
    PayloadReader::new(payload).read_nullable_base58()
}

pub fn decode_public_key(payload: &[u8]) -> Result<PublicKeyRecord, DecodeError> {
    require_min("PUBLIC_KEY", payload, ADDRESS_LENGTH + 4)?;
    let mut r = PayloadReader::new(payload);

    Ok(PublicKeyRecord {
        address: r.read_address()?,
        public_key: r.read_nullable_base58()?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn account_payload() -> Vec<u8> {
        let mut p = vec![0x3A; ADDRESS_LENGTH];
        p.extend_from_slice(&[0x11; SIGNATURE_LENGTH]);
        p.extend_from_slice(&[0x22; PUBLIC_KEY_LENGTH]);
        for v in [1i32, 0, 3, 1200, -5, 7] {
            p.extend_from_slice(&v.to_be_bytes());
        }
        p
    }

    #[test]
    fn test_decode_account() {
        let account = decode_account(&account_payload()).unwrap();
        assert_eq!(account.address, bs58::encode([0x3A; 25]).into_string());
        assert_eq!(account.default_group_id, 1);
        assert_eq!(account.level, 3);
        assert_eq!(account.blocks_minted, 1200);
        assert_eq!(account.blocks_minted_adjustment, -5);
        assert_eq!(account.blocks_minted_penalty, 7);
    }

    #[test]
    fn test_short_account_rejected() {
        let payload = account_payload();
        assert!(matches!(
            decode_account(&payload[..ACCOUNT_MIN_LEN - 1]),
            Err(DecodeError::TooShort { min: 145, .. })
        ));
    }

    #[test]
    fn test_decode_balance() {
        let mut p = vec![0x3A; ADDRESS_LENGTH];
        p.extend_from_slice(&0u64.to_be_bytes());
        p.extend_from_slice(&1_234_500_000i64.to_be_bytes());

        let balance = decode_account_balance(&p).unwrap();
        assert_eq!(balance.asset_id, 0);
        assert_eq!(balance.balance.to_string(), "12.345");
        assert!(decode_account_balance(&p[..40]).is_err());
    }

    #[test]
    fn test_public_key_absent() {
        let mut p = vec![0x3A; ADDRESS_LENGTH];
        p.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(decode_public_key(&p).unwrap().public_key, None);
    }
}
