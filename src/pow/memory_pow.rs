//! Memory-hard nonce search, compatible with the node's MemoryPoW v2.
//!
//! The 32-byte hash is read as four big-endian words. Each candidate nonce
//! advances a running seed by one multiplication, seeds a xoshiro256+
//! generator with `hash ^ seed`, fills the work buffer with generator output
//! and XORs together 1024 randomly chosen words starting from the first. The
//! nonce is accepted when that result has at least `difficulty` leading zero
//! bits.

const SEED: u64 = 8_682_522_807_148_012;
const SEED_MULTIPLIER: u64 = 1_181_783_497_276_652_981;

/// Random reads per nonce
const BOUNCES: usize = 1024;

const WORD: usize = 8;

/// Returned when the whole u32 range has been searched without success
pub const NO_NONCE: i64 = -1;

struct Xoshiro256Plus {
    s: [u64; 4],
}

impl Xoshiro256Plus {
    fn seeded(hash: &[u64; 4], seed: u64) -> Self {
        Self {
            s: [hash[0] ^ seed, hash[1] ^ seed, hash[2] ^ seed, hash[3] ^ seed],
        }
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let s = &mut self.s;
        let result = s[0].wrapping_add(s[3]);
        let t = s[1] << 17;

        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];
        s[2] ^= t;
        s[3] = s[3].rotate_left(45);

        result
    }
}

fn hash_words(hash: &[u8; 32]) -> [u64; 4] {
    let mut words = [0u64; 4];
    for (word, chunk) in words.iter_mut().zip(hash.chunks_exact(WORD)) {
        let mut bytes = [0u8; WORD];
        bytes.copy_from_slice(chunk);
        *word = u64::from_be_bytes(bytes);
    }
    words
}

#[inline]
fn read_word(work: &[u8], index: usize) -> u64 {
    let at = index * WORD;
    let mut bytes = [0u8; WORD];
    bytes.copy_from_slice(&work[at..at + WORD]);
    u64::from_le_bytes(bytes)
}

/// Seed in effect for `nonce`: the base seed multiplied `nonce + 1` times.
fn seed_for(nonce: u32) -> u64 {
    SEED.wrapping_mul(SEED_MULTIPLIER.wrapping_pow(nonce))
        .wrapping_mul(SEED_MULTIPLIER)
}

/// Fill the buffer and bounce through it. `work` holds at least one word.
fn mix(words: &[u64; 4], work: &mut [u8], seed: u64) -> u64 {
    let mut rng = Xoshiro256Plus::seeded(words, seed);
    let word_count = work.len() / WORD;
    for chunk in work.chunks_exact_mut(WORD) {
        chunk.copy_from_slice(&rng.next_u64().to_le_bytes());
    }

    let mut result = read_word(work, 0);
    for _ in 0..BOUNCES {
        let index = (rng.next_u64() & 0x7FFF_FFFF) as usize % word_count;
        result ^= read_word(work, index);
    }
    result
}

#[inline]
fn meets(result: u64, difficulty: u32) -> bool {
    result.leading_zeros() >= difficulty
}

/// Search nonces from zero upward. Returns [`NO_NONCE`] on exhaustion or
/// when `work` is shorter than one word.
pub fn compute(hash: &[u8; 32], work: &mut [u8], difficulty: u32) -> i64 {
    if work.len() < WORD {
        return NO_NONCE;
    }
    let words = hash_words(hash);
    let mut seed = SEED;
    for nonce in 0..=u32::MAX {
        seed = seed.wrapping_mul(SEED_MULTIPLIER);
        if meets(mix(&words, work, seed), difficulty) {
            return i64::from(nonce);
        }
    }
    NO_NONCE
}

/// Check a single nonce.
pub fn verify(hash: &[u8; 32], work: &mut [u8], nonce: u32, difficulty: u32) -> bool {
    if work.len() < WORD {
        return false;
    }
    meets(mix(&hash_words(hash), work, seed_for(nonce)), difficulty)
}
