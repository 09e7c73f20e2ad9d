//! Wire envelope for every message exchanged with a peer.
//!
//! ```text
//! [Magic "QORT"(4)] [Type u32BE(4)] [HasId(1)] [Id u32BE(4)]? [Length u32BE(4)]
//! [Checksum(4) = SHA-256(payload)[0..4]]? [Payload(Length)]
//! ```
//!
//! The id is present when `HasId` is non-zero; the checksum is present only when
//! `Length > 0`. Frames failing the checksum are skipped by byte count so the
//! receive buffer can resynchronise on the next magic token.

use bytes::{BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{ProtocolError, Result};

/// Magic token opening every frame
pub const MAGIC: [u8; 4] = *b"QORT";

/// Max allowed payload size (10 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Truncated SHA-256 checksum length
pub const CHECKSUM_LEN: usize = 4;

/// Magic + type + has-id flag
const FIXED_PREFIX_LEN: usize = 4 + 4 + 1;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: u32,
    pub id: Option<u32>,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(message_type: u32, id: Option<u32>, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            id,
            payload: payload.into(),
        }
    }

    /// Size of the header preceding the payload (checksum included when present)
    pub fn header_len(has_id: bool, payload_len: usize) -> usize {
        let mut len = FIXED_PREFIX_LEN + 4;
        if has_id {
            len += 4;
        }
        if payload_len > 0 {
            len += CHECKSUM_LEN;
        }
        len
    }

    /// Serialize into `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        let payload_len = self.payload.len();
        dst.reserve(Self::header_len(self.id.is_some(), payload_len) + payload_len);

        dst.put_slice(&MAGIC);
        dst.put_u32(self.message_type);
        match self.id {
            Some(id) => {
                dst.put_u8(1);
                dst.put_u32(id);
            }
            None => dst.put_u8(0),
        }
        dst.put_u32(payload_len as u32);
        if payload_len > 0 {
            dst.put_slice(&checksum(&self.payload));
            dst.put_slice(&self.payload);
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

/// Result of attempting to parse one frame from the head of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// A complete, checksum-valid frame occupying `total_length` bytes.
    Frame { frame: Frame, total_length: usize },
    /// The head of the buffer is unusable; drop this many bytes and resync.
    Discard(usize),
    /// More bytes are required.
    Insufficient,
}

/// First four bytes of SHA-256 over the payload.
pub fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

/// Frame a payload. The id is always written.
pub fn encode(message_type: u32, payload: &[u8], id: u32) -> Bytes {
    Frame::new(message_type, Some(id), Bytes::copy_from_slice(payload)).to_bytes()
}

/// Try to parse a single frame from the start of `buf`.
///
/// # Errors
/// Returns `ProtocolError::OversizedPacket` when the declared payload length
/// exceeds [`MAX_PAYLOAD_SIZE`]; the stream cannot be trusted after that.
pub fn parse(buf: &[u8]) -> Result<Parsed> {
    if buf.len() < FIXED_PREFIX_LEN {
        return Ok(Parsed::Insufficient);
    }
    if buf[..4] != MAGIC {
        return Ok(Parsed::Discard(1));
    }

    let message_type = read_u32(buf, 4);
    let has_id = buf[8] != 0;
    let mut offset = FIXED_PREFIX_LEN;

    let id = if has_id {
        if buf.len() < offset + 4 {
            return Ok(Parsed::Insufficient);
        }
        let id = read_u32(buf, offset);
        offset += 4;
        Some(id)
    } else {
        None
    };

    if buf.len() < offset + 4 {
        return Ok(Parsed::Insufficient);
    }
    let payload_len = read_u32(buf, offset) as usize;
    offset += 4;

    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::OversizedPacket(payload_len));
    }

    if payload_len == 0 {
        return Ok(Parsed::Frame {
            frame: Frame::new(message_type, id, Bytes::new()),
            total_length: offset,
        });
    }

    if buf.len() < offset + CHECKSUM_LEN + payload_len {
        return Ok(Parsed::Insufficient);
    }

    let expected = &buf[offset..offset + CHECKSUM_LEN];
    offset += CHECKSUM_LEN;
    let payload = &buf[offset..offset + payload_len];

    if checksum(payload) != expected {
        warn!(message_type, payload_len, "Invalid checksum, discarding message");
        return Ok(Parsed::Discard(offset + payload_len));
    }

    Ok(Parsed::Frame {
        frame: Frame::new(message_type, id, Bytes::copy_from_slice(payload)),
        total_length: offset + payload_len,
    })
}

/// Number of leading bytes to drop so that `buf` starts at the next magic token.
///
/// With no magic token present the whole buffer is dropped.
pub fn resync_offset(buf: &[u8]) -> usize {
    buf.windows(MAGIC.len())
        .position(|w| w == MAGIC)
        .unwrap_or(buf.len())
}

/// Length of the longest proper prefix of the magic token that ends `buf`.
pub fn partial_magic_tail(buf: &[u8]) -> usize {
    (1..MAGIC.len())
        .rev()
        .find(|&n| buf.len() >= n && buf[buf.len() - n..] == MAGIC[..n])
        .unwrap_or(0)
}

/// Drop bytes preceding the next magic token, or everything if there is none.
pub fn resync(buf: &[u8]) -> &[u8] {
    &buf[resync_offset(buf)..]
}

#[inline]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
