//! Lite node handshake state machine.
//!
//! The handshake is symmetric: each side announces itself with HELLO, answers
//! the peer's HELLO with a CHALLENGE carrying its Ed25519 public key and 32
//! random bytes, and answers the peer's CHALLENGE with a RESPONSE carrying a
//! proof-of-work nonce over `SHA256(shared_secret || their_challenge)`.
//!
//! The shared secret is X25519 between our converted private key and the
//! peer's Ed25519 public key mapped onto the Montgomery curve.
//!
//! State is session-scoped and only moves forward:
//! `Init -> HelloSent -> ChallengeExchanged -> Authenticated`.
//! This type performs no I/O; the session drives it and spawns the nonce
//! search.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::core::payloads::{self, CHALLENGE_LENGTH, PUBLIC_KEY_LENGTH, RESPONSE_HASH_LENGTH};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::keys::LocalKeys;

/// Minimum RESPONSE payload: nonce followed by the response hash
pub const RESPONSE_MIN_LEN: usize = 4 + RESPONSE_HASH_LENGTH;

/// Handshake progress. Ordered so that `advance` can refuse to go back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandshakeState {
    Init,
    HelloSent,
    ChallengeExchanged,
    Authenticated,
}

/// Per-session handshake material and progress
pub struct Handshake {
    keys: LocalKeys,
    our_challenge: [u8; CHALLENGE_LENGTH],
    remote_public_key: Option<[u8; PUBLIC_KEY_LENGTH]>,
    shared_secret: Option<Zeroizing<[u8; 32]>>,
    state: HandshakeState,
    challenge_sent: bool,
    challenge_handled: bool,
}

impl Handshake {
    /// Fresh identity and challenge from the system RNG
    pub fn new() -> Result<Self> {
        let mut challenge = [0u8; CHALLENGE_LENGTH];
        getrandom::fill(&mut challenge[..])
            .map_err(|e| ProtocolError::SecurityError(format!("{}: {e}", constants::ERR_ENTROPY)))?;
        Ok(Self::with_identity(LocalKeys::generate()?, challenge))
    }

    pub fn with_identity(keys: LocalKeys, our_challenge: [u8; CHALLENGE_LENGTH]) -> Self {
        Self {
            keys,
            our_challenge,
            remote_public_key: None,
            shared_secret: None,
            state: HandshakeState::Init,
            challenge_sent: false,
            challenge_handled: false,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == HandshakeState::Authenticated
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.keys.ed25519_public()
    }

    pub fn our_challenge(&self) -> &[u8; CHALLENGE_LENGTH] {
        &self.our_challenge
    }

    pub fn remote_public_key(&self) -> Option<&[u8; PUBLIC_KEY_LENGTH]> {
        self.remote_public_key.as_ref()
    }

    /// Move to `next` if it lies ahead of the current state.
    ///
    /// Returns whether the state changed.
    pub fn advance(&mut self, next: HandshakeState) -> bool {
        if next > self.state {
            debug!(from = ?self.state, to = ?next, "Handshake state advanced");
            self.state = next;
            true
        } else {
            false
        }
    }

    /// HELLO payload announcing this node; marks HELLO as sent.
    pub fn hello(&mut self, timestamp: i64, version: &str, node_label: &str) -> Bytes {
        self.advance(HandshakeState::HelloSent);
        payloads::hello(timestamp, version, node_label)
    }

    /// Answer a peer HELLO with our CHALLENGE.
    ///
    /// Only the first HELLO produces a challenge; repeats yield `None`.
    pub fn on_hello(&mut self) -> Option<Bytes> {
        if self.challenge_sent {
            debug!("Ignoring repeated HELLO");
            return None;
        }
        self.challenge_sent = true;
        Some(payloads::challenge(self.keys.ed25519_public(), &self.our_challenge))
    }

    /// Process a peer CHALLENGE and return the hash the nonce search runs over.
    ///
    /// Yields `Ok(None)` if a challenge was already handled for this session.
    ///
    /// # Errors
    /// Returns `ProtocolError::HandshakeError` if HELLO was never sent, the
    /// payload is shorter than 64 bytes, or the peer key is not a usable point.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn on_challenge(&mut self, payload: &[u8]) -> Result<Option<[u8; RESPONSE_HASH_LENGTH]>> {
        if self.challenge_handled {
            debug!("Ignoring repeated CHALLENGE");
            return Ok(None);
        }
        if self.state < HandshakeState::HelloSent {
            return Err(ProtocolError::HandshakeError(constants::ERR_HELLO_NOT_SENT.into()));
        }
        if payload.len() < PUBLIC_KEY_LENGTH + CHALLENGE_LENGTH {
            return Err(ProtocolError::HandshakeError(constants::ERR_CHALLENGE_TOO_SHORT.into()));
        }

        let mut remote_key = [0u8; PUBLIC_KEY_LENGTH];
        remote_key.copy_from_slice(&payload[..PUBLIC_KEY_LENGTH]);
        let their_challenge = &payload[PUBLIC_KEY_LENGTH..PUBLIC_KEY_LENGTH + CHALLENGE_LENGTH];

        let shared = self.keys.shared_secret(&remote_key).map_err(|e| {
            warn!(error = %e, "Rejecting peer public key");
            ProtocolError::HandshakeError(e.to_string())
        })?;
        let hash = response_hash(shared.as_slice(), their_challenge);

        // Key material is fixed for the session once accepted
        if self.remote_public_key.is_none() {
            self.remote_public_key = Some(remote_key);
            self.shared_secret = Some(shared);
        }
        self.challenge_handled = true;
        self.advance(HandshakeState::ChallengeExchanged);
        Ok(Some(hash))
    }

    /// The hash a peer must echo in its RESPONSE to our challenge.
    ///
    /// # Errors
    /// Returns `ProtocolError::HandshakeError` before the peer's CHALLENGE arrived.
    pub fn expected_response_hash(&self) -> Result<[u8; RESPONSE_HASH_LENGTH]> {
        let shared = self
            .shared_secret
            .as_ref()
            .ok_or_else(|| ProtocolError::HandshakeError(constants::ERR_REMOTE_KEY_MISSING.into()))?;
        Ok(response_hash(shared.as_slice(), &self.our_challenge))
    }

    /// Process a peer RESPONSE.
    ///
    /// With `verify_hash` set the echoed hash must match
    /// [`expected_response_hash`](Self::expected_response_hash). The nonce
    /// itself is not checked. Returns `true` exactly once, on the transition
    /// into `Authenticated`.
    ///
    /// # Errors
    /// Returns `ProtocolError::HandshakeError` on a short payload or a hash mismatch.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn on_response(&mut self, payload: &[u8], verify_hash: bool) -> Result<bool> {
        if payload.len() < RESPONSE_MIN_LEN {
            return Err(ProtocolError::HandshakeError(constants::ERR_RESPONSE_TOO_SHORT.into()));
        }
        if self.is_authenticated() {
            return Ok(false);
        }
        if verify_hash {
            let expected = self.expected_response_hash()?;
            if payload[4..RESPONSE_MIN_LEN] != expected {
                return Err(ProtocolError::HandshakeError(constants::ERR_RESPONSE_MISMATCH.into()));
            }
        }
        Ok(self.advance(HandshakeState::Authenticated))
    }
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("state", &self.state)
            .field("challenge_sent", &self.challenge_sent)
            .field("challenge_handled", &self.challenge_handled)
            .field("has_remote_key", &self.remote_public_key.is_some())
            .finish_non_exhaustive()
    }
}

/// `SHA256(shared_secret || challenge)`
pub fn response_hash(shared_secret: &[u8], challenge: &[u8]) -> [u8; RESPONSE_HASH_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret);
    hasher.update(challenge);
    hasher.finalize().into()
}

/// Split a RESPONSE payload into nonce and hash.
///
/// # Errors
/// Returns `ProtocolError::HandshakeError` if the payload is under 36 bytes.
pub fn parse_response(payload: &[u8]) -> Result<(u32, [u8; RESPONSE_HASH_LENGTH])> {
    if payload.len() < RESPONSE_MIN_LEN {
        return Err(ProtocolError::HandshakeError(constants::ERR_RESPONSE_TOO_SHORT.into()));
    }
    let mut nonce = [0u8; 4];
    nonce.copy_from_slice(&payload[..4]);
    let mut hash = [0u8; RESPONSE_HASH_LENGTH];
    hash.copy_from_slice(&payload[4..RESPONSE_MIN_LEN]);
    Ok((u32::from_be_bytes(nonce), hash))
}
