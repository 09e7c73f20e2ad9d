//! # Peer Management
//!
//! Owns the pool of live sessions and decides which peers to talk to.
//!
//! ## Components
//! - **Manager**: connection ordering, discovery and pruning loops, client selection
//! - **Discovered**: the shared set of addresses learned from peers
//!
//! Sessions report back through [`PeerRegistry`]; they hold it weakly so the
//! manager can be dropped while sessions are still winding down.

pub mod discovered;
pub mod manager;

use std::sync::Arc;

use crate::client::Session;

pub use discovered::DiscoveredPeers;
pub use manager::{PeerManager, PeerStats};

/// Callbacks a session makes into whoever owns it.
pub trait PeerRegistry: Send + Sync {
    /// A session finished its handshake and can serve requests
    fn register(&self, session: Arc<Session>);

    /// The session for `key` is gone
    fn remove_peer(&self, key: &str);

    fn update_peer_stats(&self, key: &str, success: bool);

    fn update_peer_chain_tip(&self, key: &str, height: i32, timestamp: i64);
}
