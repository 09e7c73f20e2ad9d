//! Cursor over a response payload.
//!
//! Field conventions shared by every decoder:
//! - integers are big-endian
//! - strings and byte blobs carry a 4-byte length; length 0 means absent
//! - tri-state booleans are 4 bytes: 0 absent, 1 false, 2 true
//! - addresses (25), public keys (32) and signatures/references (64) are
//!   fixed width and surfaced as Base58
//! - amounts are 8-byte integers scaled by 1e8

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::DecodeError;

pub const ADDRESS_LENGTH: usize = 25;
pub const PUBLIC_KEY_LENGTH: usize = 32;
pub const SIGNATURE_LENGTH: usize = 64;

type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Fixed-point amount with eight decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub i64);

impl Amount {
    pub const SCALE: i64 = 100_000_000;

    pub fn raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        let whole = abs / scale;
        let frac = abs % scale;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let digits = format!("{frac:08}");
        write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Reject payloads below a type's minimum length before decoding.
pub fn require_min(kind: &'static str, payload: &[u8], min: usize) -> DecodeResult<()> {
    if payload.len() < min {
        return Err(DecodeError::TooShort {
            kind,
            len: payload.len(),
            min,
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(DecodeError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> DecodeResult<i32> {
        self.read_array().map(i32::from_be_bytes)
    }

    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        self.read_array().map(u32::from_be_bytes)
    }

    pub fn read_i64(&mut self) -> DecodeResult<i64> {
        self.read_array().map(i64::from_be_bytes)
    }

    pub fn read_u64(&mut self) -> DecodeResult<u64> {
        self.read_array().map(u64::from_be_bytes)
    }

    /// 8-byte timestamp where 0 means "not set"
    pub fn read_optional_timestamp(&mut self) -> DecodeResult<Option<i64>> {
        self.read_i64().map(|ts| (ts != 0).then_some(ts))
    }

    pub fn read_amount(&mut self) -> DecodeResult<Amount> {
        self.read_i64().map(Amount)
    }

    pub fn read_base58(&mut self, len: usize) -> DecodeResult<String> {
        Ok(bs58::encode(self.take(len)?).into_string())
    }

    pub fn read_address(&mut self) -> DecodeResult<String> {
        self.read_base58(ADDRESS_LENGTH)
    }

    pub fn read_public_key(&mut self) -> DecodeResult<String> {
        self.read_base58(PUBLIC_KEY_LENGTH)
    }

    /// Signatures and references share the same 64-byte width
    pub fn read_signature(&mut self) -> DecodeResult<String> {
        self.read_base58(SIGNATURE_LENGTH)
    }

    pub fn read_nullable_bytes(&mut self) -> DecodeResult<Option<&'a [u8]>> {
        let len = self.read_u32()? as usize;
        if len == 0 {
            return Ok(None);
        }
        self.take(len).map(Some)
    }

    pub fn read_nullable_string(&mut self) -> DecodeResult<Option<String>> {
        match self.read_nullable_bytes()? {
            Some(bytes) => std::str::from_utf8(bytes)
                .map(|s| Some(s.to_owned()))
                .map_err(|_| DecodeError::InvalidUtf8),
            None => Ok(None),
        }
    }

    /// Length-prefixed string where zero length is the empty string
    pub fn read_string(&mut self) -> DecodeResult<String> {
        self.read_nullable_string().map(Option::unwrap_or_default)
    }

    pub fn read_nullable_base58(&mut self) -> DecodeResult<Option<String>> {
        Ok(self
            .read_nullable_bytes()?
            .map(|bytes| bs58::encode(bytes).into_string()))
    }

    pub fn read_flag(&mut self) -> DecodeResult<Option<bool>> {
        match self.read_u32()? {
            0 => Ok(None),
            1 => Ok(Some(false)),
            2 => Ok(Some(true)),
            other => Err(DecodeError::InvalidFlag(other)),
        }
    }

    /// Tri-state flag where absent reads as `false`
    pub fn read_flag_or_false(&mut self) -> DecodeResult<bool> {
        self.read_flag().map(Option::unwrap_or_default)
    }

    /// Read a record count and check it is plausible for the bytes left.
    ///
    /// `min_record_len` is the smallest encoding of one record; a count that
    /// could not possibly fit is rejected before anything is allocated.
    pub fn read_count(&mut self, min_record_len: usize) -> DecodeResult<usize> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(DecodeError::InvalidCount(count));
        }
        let needed = (count as usize).saturating_mul(min_record_len.max(1));
        if needed > self.remaining() {
            return Err(DecodeError::InvalidCount(count));
        }
        Ok(count as usize)
    }

    /// Decode `count` records with `read_one`.
    pub fn read_list<T>(
        &mut self,
        min_record_len: usize,
        mut read_one: impl FnMut(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<Vec<T>> {
        let count = self.read_count(min_record_len)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(read_one(self)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount(150_000_000).to_string(), "1.5");
        assert_eq!(Amount(0).to_string(), "0");
        assert_eq!(Amount(1).to_string(), "0.00000001");
        assert_eq!(Amount(-250_000_000).to_string(), "-2.5");
        assert_eq!(Amount(12 * Amount::SCALE).to_string(), "12");
    }

    #[test]
    fn test_nullable_string() {
        let mut buf = 0u32.to_be_bytes().to_vec();
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(b"abc");

        let mut reader = PayloadReader::new(&buf);
        assert_eq!(reader.read_nullable_string().unwrap(), None);
        assert_eq!(reader.read_nullable_string().unwrap().as_deref(), Some("abc"));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_flag_values() {
        let mut buf = Vec::new();
        for v in [0u32, 1, 2, 3] {
            buf.extend_from_slice(&v.to_be_bytes());
        }
        let mut reader = PayloadReader::new(&buf);
        assert_eq!(reader.read_flag().unwrap(), None);
        assert_eq!(reader.read_flag().unwrap(), Some(false));
        assert_eq!(reader.read_flag().unwrap(), Some(true));
        assert_eq!(reader.read_flag(), Err(DecodeError::InvalidFlag(3)));
    }

    #[test]
    fn test_truncated_read_does_not_advance() {
        let buf = [0u8; 3];
        let mut reader = PayloadReader::new(&buf);
        assert_eq!(
            reader.read_i32(),
            Err(DecodeError::Truncated {
                needed: 4,
                remaining: 3
            })
        );
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_implausible_count_rejected() {
        let mut buf = 1_000_000i32.to_be_bytes().to_vec();
        buf.extend_from_slice(&[0u8; 16]);
        let mut reader = PayloadReader::new(&buf);
        assert_eq!(
            reader.read_count(8),
            Err(DecodeError::InvalidCount(1_000_000))
        );

        let negative = (-1i32).to_be_bytes();
        assert_eq!(
            PayloadReader::new(&negative).read_count(1),
            Err(DecodeError::InvalidCount(-1))
        );
    }

    #[test]
    fn test_nullable_bytes_longer_than_payload() {
        let mut buf = 10u32.to_be_bytes().to_vec();
        buf.extend_from_slice(&[1, 2]);
        assert!(matches!(
            PayloadReader::new(&buf).read_nullable_bytes(),
            Err(DecodeError::Truncated { needed: 10, .. })
        ));
    }
}
