//! Bump-allocated scratch memory shared by every proof-of-work computation.
//!
//! The region starts with a reserved prefix; allocations advance a break
//! pointer past it. Requests that do not fit are parked in a FIFO and served
//! when [`ScratchArena::reset`] rewinds the break.

use std::collections::VecDeque;
use std::ops::Range;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{constants, ProtocolError, Result};

/// 256 pages of 64 KiB
pub const DEFAULT_SCRATCH_SIZE: usize = 256 * 64 * 1024;

/// Initial break; the prefix below it is never handed out
pub const DEFAULT_RESERVED: usize = 512 * 1024;

/// A range of the scratch region handed out by the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

impl Region {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

struct Waiter {
    size: usize,
    tx: oneshot::Sender<Region>,
}

struct BreakState {
    brk: usize,
    waiters: VecDeque<Waiter>,
}

pub struct ScratchArena {
    memory: Mutex<Vec<u8>>,
    state: Mutex<BreakState>,
    capacity: usize,
    reserved: usize,
}

impl ScratchArena {
    pub fn new(capacity: usize, reserved: usize) -> Result<Self> {
        if reserved > capacity {
            return Err(ProtocolError::ConfigError(format!(
                "Scratch reserve {reserved} exceeds capacity {capacity}"
            )));
        }
        Ok(Self {
            memory: Mutex::new(vec![0u8; capacity]),
            state: Mutex::new(BreakState {
                brk: reserved,
                waiters: VecDeque::new(),
            }),
            capacity,
            reserved,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest single allocation the arena can ever satisfy
    pub fn usable(&self) -> usize {
        self.capacity - self.reserved
    }

    pub fn brk(&self) -> usize {
        self.state.lock().brk
    }

    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Advance the break by `size` if it fits.
    pub fn try_allocate(&self, size: usize) -> Option<Region> {
        let mut state = self.state.lock();
        Self::sbrk(&mut state, self.capacity, size)
    }

    /// Allocate `size` bytes, waiting for a reset when the region is exhausted.
    pub async fn allocate(&self, size: usize) -> Result<Region> {
        let rx = {
            let mut state = self.state.lock();
            if let Some(region) = Self::sbrk(&mut state, self.capacity, size) {
                return Ok(region);
            }
            if size > self.usable() {
                return Err(ProtocolError::PowError(format!(
                    "{}: requested {size}, usable {}",
                    constants::ERR_ALLOCATION_TOO_LARGE,
                    self.usable()
                )));
            }
            debug!(size, brk = state.brk, "Scratch region exhausted, queueing allocation");
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter { size, tx });
            rx
        };

        rx.await
            .map_err(|_| ProtocolError::PowError(constants::ERR_ALLOCATION_ABANDONED.to_string()))
    }

    /// Rewind the break and serve queued allocations in arrival order.
    ///
    /// A waiter that still does not fit stays queued; later, smaller requests
    /// may be served ahead of it.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.brk = self.reserved;

        let mut remaining = VecDeque::with_capacity(state.waiters.len());
        while let Some(waiter) = state.waiters.pop_front() {
            match Self::sbrk(&mut state, self.capacity, waiter.size) {
                Some(region) => {
                    if waiter.tx.send(region).is_err() {
                        // Receiver gone; hand the space back
                        state.brk = region.offset;
                    }
                }
                None => remaining.push_back(waiter),
            }
        }
        state.waiters = remaining;
    }

    /// Run `f` with exclusive access to the whole region.
    pub fn with_memory<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut memory = self.memory.lock();
        f(&mut memory)
    }

    pub fn write(&self, region: Region, data: &[u8]) {
        let len = data.len().min(region.len);
        self.with_memory(|memory| memory[region.offset..region.offset + len].copy_from_slice(&data[..len]));
    }

    fn sbrk(state: &mut BreakState, capacity: usize, size: usize) -> Option<Region> {
        let end = state.brk.checked_add(size)?;
        if end > capacity {
            return None;
        }
        let region = Region {
            offset: state.brk,
            len: size,
        };
        state.brk = end;
        Some(region)
    }
}

impl std::fmt::Debug for ScratchArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ScratchArena")
            .field("capacity", &self.capacity)
            .field("reserved", &self.reserved)
            .field("brk", &state.brk)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_regions_never_overlap() {
        let arena = ScratchArena::new(4096, 512).unwrap();
        let a = arena.try_allocate(32).unwrap();
        let b = arena.try_allocate(1000).unwrap();
        let c = arena.try_allocate(2000).unwrap();

        assert_eq!(a.offset, 512);
        assert_eq!(b.offset, a.end());
        assert_eq!(c.offset, b.end());
        assert!(arena.try_allocate(1000).is_none());
    }

    #[test]
    fn test_reset_rewinds_to_reserved() {
        let arena = ScratchArena::new(4096, 512).unwrap();
        arena.try_allocate(1024).unwrap();
        arena.reset();
        assert_eq!(arena.brk(), 512);
    }

    #[test]
    fn test_rejects_reserve_above_capacity() {
        assert!(ScratchArena::new(100, 200).is_err());
    }

    #[tokio::test]
    async fn test_oversized_allocation_errors() {
        let arena = ScratchArena::new(4096, 512).unwrap();
        assert!(matches!(
            arena.allocate(4000).await,
            Err(ProtocolError::PowError(_))
        ));
    }

    #[tokio::test]
    async fn test_waiter_served_on_reset() {
        let arena = Arc::new(ScratchArena::new(4096, 512).unwrap());
        arena.try_allocate(3000).unwrap();

        let waiting = {
            let arena = Arc::clone(&arena);
            tokio::spawn(async move { arena.allocate(2000).await })
        };

        while arena.pending_waiters() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        arena.reset();

        let region = waiting.await.unwrap().unwrap();
        assert_eq!(region.offset, 512);
        assert_eq!(arena.brk(), 2512);
        assert_eq!(arena.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_returns_space() {
        let arena = Arc::new(ScratchArena::new(4096, 512).unwrap());
        arena.try_allocate(3000).unwrap();

        let waiting = {
            let arena = Arc::clone(&arena);
            tokio::spawn(async move { arena.allocate(2000).await })
        };
        while arena.pending_waiters() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        waiting.abort();
        let _ = waiting.await;

        arena.reset();
        assert_eq!(arena.brk(), 512);
    }
}
