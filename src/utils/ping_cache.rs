//! Recently echoed PING ids
//!
//! A peer-initiated PING is answered once; ids already echoed are remembered
//! here so a repeated PING with the same id is not answered twice. The cache is
//! bounded and is cleared wholesale when it would exceed its capacity, so an id
//! echoed just before a clear may be echoed again afterwards.

use std::collections::HashSet;
use tracing::debug;

/// Default number of ids remembered before the cache is cleared
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct PingCache {
    ids: HashSet<u32>,
    capacity: usize,
}

impl PingCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Remember `id` as echoed.
    ///
    /// Returns `false` when the id was already present, in which case the
    /// caller must not echo it again.
    pub fn insert(&mut self, id: u32) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.insert(id);
        if self.ids.len() > self.capacity {
            debug!(capacity = self.capacity, "Ping echo cache full, clearing");
            self.ids.clear();
        }
        true
    }

    pub fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

impl Default for PingCache {
    fn default() -> Self {
        Self::new()
    }
}
