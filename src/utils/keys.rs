//! # Key Conversion
//!
//! Sessions sign nothing; their Ed25519 identity is only used to agree on an
//! X25519 shared secret with the peer. The private side is derived the same way
//! Ed25519 expands its seed (SHA-512, low half, clamped) and the public side is
//! the birational map from the Edwards curve to its Montgomery form.
//!
//! ## Security
//! - Seeds come from the OS RNG (getrandom)
//! - Seed and derived private material are zeroed on drop (zeroize)
//! - Peer keys that do not decompress to a curve point are rejected
//! - Non-contributory shared secrets (low-order peer keys) are rejected

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{constants, ProtocolError, Result};

pub const SEED_LENGTH: usize = 32;
pub const KEY_LENGTH: usize = 32;

/// Derive the X25519 private scalar for an Ed25519 seed.
pub fn ed25519_to_x25519_private(seed: &[u8; SEED_LENGTH]) -> [u8; KEY_LENGTH] {
    let mut hash = Sha512::digest(seed);
    let mut out = [0u8; KEY_LENGTH];
    out.copy_from_slice(&hash[..KEY_LENGTH]);
    hash.as_mut_slice().zeroize();

    out[0] &= 248;
    out[31] &= 127;
    out[31] |= 64;
    out
}

/// Map an Ed25519 public key onto the Montgomery curve.
pub fn ed25519_to_x25519_public(public_key: &[u8; KEY_LENGTH]) -> Result<[u8; KEY_LENGTH]> {
    CompressedEdwardsY(*public_key)
        .decompress()
        .map(|point| point.to_montgomery().to_bytes())
        .ok_or_else(|| ProtocolError::InvalidKey(constants::ERR_INVALID_REMOTE_KEY.to_string()))
}

/// Local key material for one session.
pub struct LocalKeys {
    seed: Zeroizing<[u8; SEED_LENGTH]>,
    ed25519_public: [u8; KEY_LENGTH],
    x25519_secret: StaticSecret,
    x25519_public: [u8; KEY_LENGTH],
}

impl LocalKeys {
    /// Fresh keys from a random seed.
    pub fn generate() -> Result<Self> {
        let mut seed = Zeroizing::new([0u8; SEED_LENGTH]);
        getrandom::fill(&mut seed[..])
            .map_err(|e| ProtocolError::SecurityError(format!("{}: {e}", constants::ERR_ENTROPY)))?;
        Ok(Self::from_secret_seed(seed))
    }

    pub fn from_seed(seed: [u8; SEED_LENGTH]) -> Self {
        Self::from_secret_seed(Zeroizing::new(seed))
    }

    fn from_secret_seed(seed: Zeroizing<[u8; SEED_LENGTH]>) -> Self {
        let ed25519_public = SigningKey::from_bytes(&seed).verifying_key().to_bytes();

        let private = Zeroizing::new(ed25519_to_x25519_private(&seed));
        let x25519_secret = StaticSecret::from(*private);
        let x25519_public = X25519PublicKey::from(&x25519_secret).to_bytes();

        Self {
            seed,
            ed25519_public,
            x25519_secret,
            x25519_public,
        }
    }

    pub fn ed25519_public(&self) -> &[u8; KEY_LENGTH] {
        &self.ed25519_public
    }

    pub fn x25519_public(&self) -> &[u8; KEY_LENGTH] {
        &self.x25519_public
    }

    pub fn seed(&self) -> &[u8; SEED_LENGTH] {
        &self.seed
    }

    /// Diffie-Hellman against a peer's Ed25519 public key.
    pub fn shared_secret(&self, remote_ed25519: &[u8; KEY_LENGTH]) -> Result<Zeroizing<[u8; KEY_LENGTH]>> {
        let remote = ed25519_to_x25519_public(remote_ed25519)?;
        self.shared_secret_x25519(&remote)
    }

    /// Diffie-Hellman against an already converted X25519 public key.
    pub fn shared_secret_x25519(&self, remote_x25519: &[u8; KEY_LENGTH]) -> Result<Zeroizing<[u8; KEY_LENGTH]>> {
        let shared = self
            .x25519_secret
            .diffie_hellman(&X25519PublicKey::from(*remote_x25519));
        if !shared.was_contributory() {
            return Err(ProtocolError::InvalidKey(
                constants::ERR_INVALID_REMOTE_KEY.to_string(),
            ));
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

impl std::fmt::Debug for LocalKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeys")
            .field("ed25519_public", &bs58::encode(self.ed25519_public).into_string())
            .finish_non_exhaustive()
    }
}
