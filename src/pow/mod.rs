//! # Proof-of-Work Engine
//!
//! Computes handshake nonces over a shared scratch arena.
//!
//! ## Components
//! - **Arena**: bump allocator with a FIFO of blocked allocations
//! - **Memory PoW**: the nonce search routine
//! - **Engine**: serialises compute cycles across every session
//!
//! Only one cycle runs at a time; callers queue on a fair mutex. A cycle runs
//! on its own task, so a session that goes away mid-handshake does not cancel
//! the computation, it only discards the result.

pub mod arena;
pub mod memory_pow;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

use crate::config::PowConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::utils::metrics::{Metrics, Timer};

pub use arena::{Region, ScratchArena};

/// Work buffer length used when none is configured
pub const DEFAULT_WORK_BUFFER_LEN: usize = 2 * 1024 * 1024;

/// Difficulty used for handshake responses
pub const HANDSHAKE_DIFFICULTY: u32 = 2;

const HASH_LEN: usize = 32;

#[derive(Debug)]
pub struct PowEngine {
    arena: Arc<ScratchArena>,
    gate: Mutex<()>,
    work_buffer_len: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    metrics: Option<Arc<Metrics>>,
}

impl PowEngine {
    pub fn new(arena: Arc<ScratchArena>, work_buffer_len: usize) -> Self {
        Self {
            arena,
            gate: Mutex::new(()),
            work_buffer_len,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            metrics: None,
        }
    }

    pub fn from_config(config: &PowConfig) -> Result<Self> {
        let arena = ScratchArena::new(config.scratch_size, config.scratch_reserved)?;
        Ok(Self::new(Arc::new(arena), config.work_buffer_len))
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn arena(&self) -> &Arc<ScratchArena> {
        &self.arena
    }

    /// Highest number of compute cycles ever observed running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Find a nonce for `input` at `difficulty`.
    ///
    /// Waits for any cycle already running. The cycle itself runs on a
    /// detached task and completes even if the returned future is dropped.
    pub async fn compute(self: &Arc<Self>, input: &[u8], difficulty: u32) -> Result<u32> {
        let engine = Arc::clone(self);
        let input = input.to_vec();
        tokio::spawn(async move { engine.run_cycle(&input, difficulty).await })
            .await
            .map_err(|e| ProtocolError::PowError(format!("{}: {e}", constants::ERR_WORKER_FAILED)))?
    }

    /// Check a nonce against `input` without touching the shared arena.
    pub fn verify(&self, input: &[u8], nonce: u32, difficulty: u32) -> bool {
        let hash: [u8; HASH_LEN] = Sha256::digest(input).into();
        let mut work = vec![0u8; self.work_buffer_len];
        memory_pow::verify(&hash, &mut work, nonce, difficulty)
    }

    #[instrument(skip(self, input), fields(input_len = input.len()))]
    async fn run_cycle(&self, input: &[u8], difficulty: u32) -> Result<u32> {
        let _gate = self.gate.lock().await;
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _timer = Timer::start("pow_compute");

        let result = self.search(input, difficulty).await;
        self.arena.reset();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &result {
            Ok(nonce) => {
                debug!(nonce, "Proof-of-work nonce found");
                if let Some(metrics) = &self.metrics {
                    metrics.pow_computed();
                }
            }
            Err(e) => error!(error = %e, "Proof-of-work nonce computation failed"),
        }
        result
    }

    async fn search(&self, input: &[u8], difficulty: u32) -> Result<u32> {
        self.arena.reset();

        let hash = Sha256::digest(input);
        let hash_region = self
            .arena
            .try_allocate(HASH_LEN)
            .ok_or_else(|| ProtocolError::PowError(constants::ERR_HASH_ALLOCATION.to_string()))?;
        self.arena.write(hash_region, &hash);

        let work_region = self.arena.allocate(self.work_buffer_len).await?;

        let arena = Arc::clone(&self.arena);
        let nonce = tokio::task::spawn_blocking(move || {
            arena.with_memory(|memory| {
                let mut hash = [0u8; HASH_LEN];
                hash.copy_from_slice(&memory[hash_region.range()]);
                memory_pow::compute(&hash, &mut memory[work_region.range()], difficulty)
            })
        })
        .await
        .map_err(|e| ProtocolError::PowError(format!("{}: {e}", constants::ERR_WORKER_FAILED)))?;

        u32::try_from(nonce)
            .map_err(|_| ProtocolError::PowError(format!("Invalid nonce computed: {nonce}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn small_engine() -> Arc<PowEngine> {
        let arena = Arc::new(ScratchArena::new(64 * 1024, 1024).unwrap());
        Arc::new(PowEngine::new(arena, 8 * 1024))
    }

    #[tokio::test]
    async fn test_compute_then_verify() {
        let engine = small_engine();
        let nonce = engine.compute(b"challenge", HANDSHAKE_DIFFICULTY).await.unwrap();
        assert!(engine.verify(b"challenge", nonce, HANDSHAKE_DIFFICULTY));
        assert_eq!(engine.arena().brk(), 1024);
    }

    #[tokio::test]
    async fn test_engine_hashes_input_before_search() {
        let engine = small_engine();
        assert_eq!(engine.compute(b"qortal", HANDSHAKE_DIFFICULTY).await.unwrap(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_are_serialised() {
        let engine = small_engine();
        let tasks: Vec<_> = (0..8u8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.compute(&[i; 16], 3).await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(engine.peak_concurrency(), 1);
        assert_eq!(engine.arena().brk(), 1024);
    }

    #[tokio::test]
    async fn test_work_buffer_too_large_fails_and_resets() {
        let arena = Arc::new(ScratchArena::new(16 * 1024, 1024).unwrap());
        let engine = Arc::new(PowEngine::new(arena, 32 * 1024));
        assert!(matches!(
            engine.compute(b"x", 1).await,
            Err(ProtocolError::PowError(_))
        ));
        assert_eq!(engine.arena().brk(), 1024);
    }
}
