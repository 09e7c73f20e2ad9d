//! Peer manager integration tests over loopback sockets

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{height_v2, small_pow, wait_until, MockPeer};
use qortal_lite_protocol::config::LiteNodeConfig;
use qortal_lite_protocol::core::{payloads, MessageType};
use qortal_lite_protocol::peer::PeerStats;
use qortal_lite_protocol::utils::metrics::Metrics;
use qortal_lite_protocol::{DiscoveredPeers, PeerManager, ProtocolError};
use tokio::net::TcpListener;

fn config(seeds: Vec<String>, max_connections: usize) -> LiteNodeConfig {
    LiteNodeConfig::default_with_overrides(|c| {
        c.peers.seed_peers = seeds;
        c.peers.max_connections = max_connections;
        c.peers.discovery_enabled = false;
        c.peers.discovery_interval = Duration::from_secs(3600);
        c.peers.prune_interval = Duration::from_secs(3600);
        c.client.ping_interval = Duration::from_secs(60);
    })
}

fn manager(config: &LiteNodeConfig) -> Arc<PeerManager> {
    PeerManager::new(
        config,
        small_pow(),
        Arc::new(DiscoveredPeers::new()),
        Arc::new(Metrics::new()),
    )
}

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let key = format!("127.0.0.1:{}", listener.local_addr().expect("addr").port());
    (listener, key)
}

/// An address nothing listens on
async fn unreachable() -> String {
    let (listener, key) = listener().await;
    drop(listener);
    key
}

async fn accept_and_authenticate(listener: &TcpListener, manager: &PeerManager, key: &str) -> MockPeer {
    let (stream, _) = listener.accept().await.expect("accept");
    let mut peer = MockPeer::new(stream);
    let hash = peer.exchange_challenges().await;
    peer.send(MessageType::RESPONSE, payloads::response(0, &hash)).await;
    wait_until(|| manager.connected_peers().iter().any(|k| k == key)).await;
    peer
}

fn best_height(manager: &PeerManager) -> Option<i32> {
    manager.get_best_client()?.last_known_block_height()
}

#[tokio::test]
async fn test_initialize_without_seeds() {
    let manager = manager(&config(Vec::new(), 4));
    assert!(matches!(manager.initialize().await, Err(ProtocolError::NoPeers)));
}

#[tokio::test]
async fn test_connection_cap_stops_before_unreachable_peer() {
    let (listener, reachable) = listener().await;
    let dead = unreachable().await;

    let manager = manager(&config(vec![reachable.clone(), dead.clone()], 1));
    manager.initialize().await.expect("initialize");

    let _peer = accept_and_authenticate(&listener, &manager, &reachable).await;

    assert_eq!(manager.get_connected_count(), 1);
    wait_until(|| manager.stats(&reachable).successes == 1).await;
    // The cap was reached first, so the dead peer was never tried
    assert_eq!(manager.stats(&dead), PeerStats::default());

    manager.shutdown();
    assert_eq!(manager.get_connected_count(), 0);
}

#[tokio::test]
async fn test_failed_connect_lowers_score() {
    let dead = unreachable().await;
    let manager = manager(&config(vec![dead.clone()], 4));

    assert_eq!(manager.try_connect_to_peers(&[dead.clone()]).await, 0);
    let stats = manager.stats(&dead);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.score(), -1);
    assert!(stats.last_failure.is_some());
}

#[tokio::test]
async fn test_prune_evicts_lagging_peer() {
    let (first_listener, first) = listener().await;
    let (second_listener, second) = listener().await;

    let manager = manager(&config(vec![first.clone(), second.clone()], 4));
    assert_eq!(
        manager
            .try_connect_to_peers(&[first.clone(), second.clone()])
            .await,
        2
    );
    let mut first_peer = accept_and_authenticate(&first_listener, &manager, &first).await;
    let mut second_peer = accept_and_authenticate(&second_listener, &manager, &second).await;

    // Nobody has reported a tip yet
    assert!(manager.prune().is_empty());
    assert!(manager.get_best_client().is_none());

    first_peer
        .send(MessageType::HEIGHT_V2, height_v2(100, 1_700_000_000_000))
        .await;
    wait_until(|| best_height(&manager) == Some(100)).await;
    second_peer
        .send(MessageType::HEIGHT_V2, height_v2(110, 1_700_000_060_000))
        .await;
    wait_until(|| best_height(&manager) == Some(110)).await;

    let best = manager.get_best_client().expect("best peer");
    assert_eq!(best.key(), second);

    assert_eq!(manager.prune(), vec![first.clone()]);
    assert_eq!(manager.connected_peers(), vec![second.clone()]);
    assert_eq!(manager.metrics().snapshot().peers_evicted, 1);
    // Eviction is not a failure
    assert_eq!(manager.stats(&first).failures, 0);
    assert!(manager.random_client().is_some());

    manager.shutdown();
}
