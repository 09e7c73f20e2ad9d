//! # Error Types
//!
//! Error handling for the lite node protocol client.
//!
//! This module defines every error variant that can surface from a session,
//! the peer manager, the proof-of-work engine or the payload decoders.
//!
//! ## Error Categories
//! - **Transport Errors**: connect failures, socket errors, idle timeouts
//! - **Protocol Errors**: oversized frames, handshake failures
//! - **Request Errors**: per-request timeouts and disconnect rejections
//! - **Decode Errors**: malformed domain payloads ([`DecodeError`])
//! - **Proof-of-Work Errors**: invalid nonces, arena misuse
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Example Usage
//! ```rust
//! use qortal_lite_protocol::error::{ProtocolError, Result};
//! use tracing::error;
//!
//! fn parse_port(raw: &str) -> Result<u16> {
//!     raw.parse::<u16>()
//!         .map_err(|e| ProtocolError::ConfigError(format!("bad port {raw}: {e}")))
//! }
//!
//! if let Err(e) = parse_port("http") {
//!     error!(error = %e, "Invalid peer entry");
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Handshake errors
    pub const ERR_HELLO_NOT_SENT: &str = "Challenge received before HELLO was sent";
    pub const ERR_CHALLENGE_TOO_SHORT: &str = "CHALLENGE payload shorter than 64 bytes";
    pub const ERR_RESPONSE_TOO_SHORT: &str = "RESPONSE payload shorter than 36 bytes";
    pub const ERR_RESPONSE_MISMATCH: &str = "RESPONSE hash does not match our challenge";
    pub const ERR_REMOTE_KEY_MISSING: &str = "Remote public key not received";
    pub const ERR_INVALID_REMOTE_KEY: &str = "Remote Ed25519 key is not a valid curve point";

    /// Proof-of-work errors
    pub const ERR_HASH_ALLOCATION: &str = "Unable to allocate scratch memory for hash";
    pub const ERR_ALLOCATION_TOO_LARGE: &str = "Allocation exceeds scratch region capacity";
    pub const ERR_ALLOCATION_ABANDONED: &str = "Scratch allocation request abandoned";
    pub const ERR_WORKER_FAILED: &str = "Proof-of-work worker task failed";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_IDLE_TIMEOUT: &str = "Connection timed out (no activity)";
    pub const ERR_NOT_CONNECTED: &str = "Session is not connected";

    /// Entropy
    pub const ERR_ENTROPY: &str = "System random number generator unavailable";
    pub const ERR_SYSTEM_TIME: &str = "System time error: time went backwards";
}

/// ProtocolError is the primary error type for all client operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Disconnected before receiving response for message ID {id}")]
    Disconnected { id: u32 },

    #[error("Timeout waiting for message ID {id}")]
    RequestTimeout { id: u32 },

    #[error("Connection timed out (no activity)")]
    ConnectionTimeout,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Proof-of-work failed: {0}")]
    PowError(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Session is not connected")]
    NotConnected,

    #[error("No available peers")]
    NoPeers,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Security error: {0}")]
    SecurityError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Failures raised while decoding a domain payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("{kind} payload too short: {len} bytes (minimum {min})")]
    TooShort {
        kind: &'static str,
        len: usize,
        min: usize,
    },

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid nullable flag value {0}")]
    InvalidFlag(u32),

    #[error("invalid record count {0}")]
    InvalidCount(i32),

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
