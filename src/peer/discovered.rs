//! Addresses learned from PEERS_V2 announcements.
//!
//! One set is shared by every session and the peer manager; sessions add to
//! it and the discovery loop reads it when it needs more connections.

use std::collections::HashSet;

use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct DiscoveredPeers {
    peers: RwLock<HashSet<String>>,
}

impl DiscoveredPeers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, address: impl Into<String>) -> bool {
        self.peers.write().insert(address.into())
    }

    /// Add every address, returning how many were new.
    pub fn extend<I>(&self, addresses: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut peers = self.peers.write();
        addresses
            .into_iter()
            .filter(|address| peers.insert(address.clone()))
            .count()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers.read().contains(address)
    }

    pub fn remove(&self, address: &str) -> bool {
        self.peers.write().remove(address)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Copy of the current set, in no particular order
    pub fn snapshot(&self) -> Vec<String> {
        self.peers.read().iter().cloned().collect()
    }
}
