//! Pool of peer sessions with scoring, discovery and chain-tip pruning.
//!
//! Sessions live in two maps keyed by `host:port`: `pending` while the
//! handshake runs, `sessions` once authenticated. The manager holds the only
//! strong references; a session reports back through [`PeerRegistry`] and
//! leaves both maps when it disconnects.
//!
//! Locks are never held across a call into a session, since a session may call
//! straight back into the registry while tearing down.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::seq::IndexedRandom;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{DiscoveredPeers, PeerRegistry};
use crate::client::{Session, SessionContext};
use crate::config::{LiteNodeConfig, PeersConfig};
use crate::error::{ProtocolError, Result};
use crate::pow::PowEngine;
use crate::utils::metrics::Metrics;
use crate::utils::time::{current_timestamp_millis, lags_beyond};

/// Success and failure history for one peer key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub successes: u64,
    pub failures: u64,
    pub last_success: Option<i64>,
    pub last_failure: Option<i64>,
}

impl PeerStats {
    pub fn score(&self) -> i64 {
        self.successes as i64 - self.failures as i64
    }
}

/// Append `default_port` to addresses given without one.
pub fn normalize_peer(address: &str, default_port: u16) -> String {
    if split_host_port(address).is_some() {
        address.to_string()
    } else {
        format!("{address}:{default_port}")
    }
}

/// Split `host:port`, returning `None` if the port is missing or invalid.
pub fn split_host_port(address: &str) -> Option<(&str, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    port.parse().ok().map(|port| (host, port))
}

/// Order `candidates` for connection: highest score first, then most recent
/// success. Duplicates are dropped; ties keep their input order.
pub fn connection_order(candidates: &[String], stats: &HashMap<String, PeerStats>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ordered: Vec<&String> = candidates
        .iter()
        .filter(|candidate| seen.insert(candidate.as_str()))
        .collect();

    ordered.sort_by_key(|candidate| {
        let stats = stats.get(candidate.as_str()).copied().unwrap_or_default();
        (Reverse(stats.score()), Reverse(stats.last_success))
    });
    ordered.into_iter().cloned().collect()
}

/// Keys whose chain tip trails the best reported tip by more than the
/// tolerances. Empty when nobody has reported a tip.
pub fn lagging_peers(
    tips: &[(String, i32, i64)],
    height_tolerance: i32,
    time_tolerance: Duration,
) -> Vec<String> {
    let Some(max_height) = tips.iter().map(|(_, height, _)| *height).max() else {
        return Vec::new();
    };
    let max_timestamp = tips.iter().map(|(_, _, ts)| *ts).max().unwrap_or_default();

    tips.iter()
        .filter(|(_, height, timestamp)| {
            max_height.saturating_sub(*height) > height_tolerance
                || lags_beyond(max_timestamp, *timestamp, time_tolerance)
        })
        .map(|(key, _, _)| key.clone())
        .collect()
}

/// Key with the highest height, ties broken by the later timestamp.
pub fn best_peer(tips: &[(String, i32, i64)]) -> Option<&str> {
    tips.iter()
        .max_by_key(|(_, height, timestamp)| (*height, *timestamp))
        .map(|(key, _, _)| key.as_str())
}

pub struct PeerManager {
    config: PeersConfig,
    context: SessionContext,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    pending: Mutex<HashMap<String, Arc<Session>>>,
    connecting: Mutex<HashSet<String>>,
    stats: Mutex<HashMap<String, PeerStats>>,
    chain_tips: Mutex<HashMap<String, (i32, i64)>>,
    discovered: Arc<DiscoveredPeers>,
    metrics: Arc<Metrics>,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl PeerManager {
    /// Build a manager whose sessions report back to it.
    pub fn new(
        config: &LiteNodeConfig,
        pow: Arc<PowEngine>,
        discovered: Arc<DiscoveredPeers>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|manager: &Weak<Self>| {
            let registry: Weak<dyn PeerRegistry> = manager.clone();
            let context = SessionContext::new(config.client.clone(), pow)
                .with_metrics(Arc::clone(&metrics))
                .with_discovered(Arc::clone(&discovered))
                .with_registry(registry)
                .with_difficulty(config.pow.difficulty)
                .with_discovery(config.peers.discovery_enabled);

            Self {
                config: config.peers.clone(),
                context,
                sessions: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                connecting: Mutex::new(HashSet::new()),
                stats: Mutex::new(HashMap::new()),
                chain_tips: Mutex::new(HashMap::new()),
                discovered,
                metrics,
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }
        })
    }

    /// Manager with its own proof-of-work engine, peer set and metrics.
    pub fn from_config(config: &LiteNodeConfig) -> Result<Arc<Self>> {
        config.validate_strict()?;
        let metrics = Arc::new(Metrics::new());
        let pow = PowEngine::from_config(&config.pow)?.with_metrics(Arc::clone(&metrics));
        Ok(Self::new(
            config,
            Arc::new(pow),
            Arc::new(DiscoveredPeers::new()),
            metrics,
        ))
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn discovered(&self) -> &Arc<DiscoveredPeers> {
        &self.discovered
    }

    fn seed_peers(&self) -> Vec<String> {
        self.config
            .seed_peers
            .iter()
            .map(|peer| normalize_peer(peer, self.config.default_port))
            .collect()
    }

    /// Connect to the seed peers and start the discovery and prune loops.
    ///
    /// # Errors
    /// Returns `ProtocolError::NoPeers` if no seed peer is configured.
    #[instrument(skip(self))]
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        let seeds = self.seed_peers();
        if seeds.is_empty() {
            return Err(ProtocolError::NoPeers);
        }
        info!(seeds = seeds.len(), "Initializing peer manager");

        let opened = self.try_connect_to_peers(&seeds).await;
        if opened == 0 {
            warn!("No seed peer reachable; discovery will keep retrying");
        }
        self.start();
        Ok(())
    }

    /// Start the periodic loops. Later calls do nothing.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(discovery_loop(
            Arc::downgrade(self),
            self.config.discovery_interval,
            self.shutdown.clone(),
        ));
        tokio::spawn(prune_loop(
            Arc::downgrade(self),
            self.config.prune_interval,
            self.shutdown.clone(),
        ));
    }

    /// Sessions that are authenticated, handshaking or being connected
    fn occupied_slots(&self) -> usize {
        let live = self.sessions.read().len();
        let pending = self.pending.lock().len();
        live + pending + self.connecting.lock().len()
    }

    fn is_known(&self, key: &str) -> bool {
        if self.sessions.read().contains_key(key) {
            return true;
        }
        self.pending.lock().contains_key(key)
    }

    pub fn stats(&self, key: &str) -> PeerStats {
        self.stats.lock().get(key).copied().unwrap_or_default()
    }

    /// Connect to `candidates` in score order until the connection cap is hit.
    ///
    /// Returns the number of sockets opened. Failed attempts count against the
    /// peer's score.
    pub async fn try_connect_to_peers(self: &Arc<Self>, candidates: &[String]) -> usize {
        let ordered = {
            let stats = self.stats.lock();
            connection_order(candidates, &stats)
        };

        let mut opened = 0;
        for key in ordered {
            if self.shutdown.is_cancelled() || self.occupied_slots() >= self.config.max_connections {
                break;
            }
            if self.is_known(&key) || !self.connecting.lock().insert(key.clone()) {
                continue;
            }

            let result = match split_host_port(&key) {
                Some((host, port)) => Session::connect(host, port, self.context.clone()).await,
                None => Err(ProtocolError::ConfigError(format!("Invalid peer address {key}"))),
            };
            self.connecting.lock().remove(&key);

            match result {
                Ok(session) => {
                    debug!(peer = %key, "Connection opened");
                    // register() takes this lock first, so a session that
                    // authenticated already is not parked here again
                    let mut pending = self.pending.lock();
                    if !session.is_closed() && !self.sessions.read().contains_key(&key) {
                        pending.insert(key, session);
                    }
                    opened += 1;
                }
                Err(e) => {
                    debug!(peer = %key, error = %e, "Connection attempt failed");
                    self.update_peer_stats(&key, false);
                }
            }
        }
        opened
    }

    /// One discovery round: top up connections from discovered and seed peers.
    pub async fn discover(self: &Arc<Self>) -> usize {
        if self.occupied_slots() >= self.config.max_connections {
            return 0;
        }
        let mut candidates = self.discovered.snapshot();
        candidates.extend(self.seed_peers());
        let opened = self.try_connect_to_peers(&candidates).await;
        debug!(candidates = candidates.len(), opened, "Discovery round finished");
        opened
    }

    fn live_tips(&self) -> Vec<(String, i32, i64)> {
        let sessions = self.sessions.read();
        let tips = self.chain_tips.lock();
        tips.iter()
            .filter(|(key, _)| sessions.contains_key(key.as_str()))
            .map(|(key, (height, timestamp))| (key.clone(), *height, *timestamp))
            .collect()
    }

    /// Evict sessions whose chain tip lags the best one. Returns evicted keys.
    pub fn prune(&self) -> Vec<String> {
        let evicted = lagging_peers(
            &self.live_tips(),
            self.config.height_tolerance,
            self.config.time_tolerance,
        );

        for key in &evicted {
            let session = self.sessions.write().remove(key);
            self.chain_tips.lock().remove(key);
            if let Some(session) = session {
                info!(peer = %key, tip = ?session.chain_tip(), "Evicting lagging peer");
                session.destroy();
                self.metrics.peer_evicted();
            }
        }
        evicted
    }

    /// Session reporting the highest chain tip, if any has reported one
    pub fn get_best_client(&self) -> Option<Arc<Session>> {
        let tips = self.live_tips();
        let key = best_peer(&tips)?;
        self.sessions.read().get(key).cloned()
    }

    /// Any authenticated session
    pub fn random_client(&self) -> Option<Arc<Session>> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        sessions.choose(&mut rand::rng()).cloned()
    }

    pub fn get_connected_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn connected_peers(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Stop the loops and destroy every session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let mut sessions: Vec<Arc<Session>> = self.sessions.write().drain().map(|(_, s)| s).collect();
        sessions.extend(self.pending.lock().drain().map(|(_, s)| s));
        self.chain_tips.lock().clear();

        info!(sessions = sessions.len(), "Shutting down peer manager");
        for session in sessions {
            session.destroy();
        }
    }
}

impl PeerRegistry for PeerManager {
    fn register(&self, session: Arc<Session>) {
        let key = session.key().to_string();
        self.pending.lock().remove(&key);
        if session.is_closed() || self.shutdown.is_cancelled() {
            return;
        }
        info!(peer = %key, "Peer authenticated");
        self.sessions.write().insert(key, session);
    }

    fn remove_peer(&self, key: &str) {
        let removed = self.sessions.write().remove(key).is_some();
        let pending = self.pending.lock().remove(key).is_some();
        self.chain_tips.lock().remove(key);
        if removed || pending {
            debug!(peer = %key, "Peer removed");
        }
    }

    fn update_peer_stats(&self, key: &str, success: bool) {
        let now = current_timestamp_millis().ok();
        let mut stats = self.stats.lock();
        let entry = stats.entry(key.to_string()).or_default();
        if success {
            entry.successes += 1;
            entry.last_success = now;
        } else {
            entry.failures += 1;
            entry.last_failure = now;
        }
        debug!(peer = %key, success, score = entry.score(), "Peer stats updated");
    }

    fn update_peer_chain_tip(&self, key: &str, height: i32, timestamp: i64) {
        self.chain_tips.lock().insert(key.to_string(), (height, timestamp));
    }
}

async fn discovery_loop(manager: Weak<PeerManager>, period: Duration, shutdown: CancellationToken) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let Some(manager) = manager.upgrade() else {
            return;
        };
        manager.discover().await;
    }
}

async fn prune_loop(manager: Weak<PeerManager>, period: Duration, shutdown: CancellationToken) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let Some(manager) = manager.upgrade() else {
            return;
        };
        let evicted = manager.prune();
        if !evicted.is_empty() {
            info!(evicted = evicted.len(), "Pruned lagging peers");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stats(successes: u64, failures: u64) -> PeerStats {
        PeerStats {
            successes,
            failures,
            ..Default::default()
        }
    }

    fn tip(key: &str, height: i32, timestamp: i64) -> (String, i32, i64) {
        (key.to_string(), height, timestamp)
    }

    #[test]
    fn test_normalize_peer() {
        assert_eq!(normalize_peer("10.0.0.1", 12392), "10.0.0.1:12392");
        assert_eq!(normalize_peer("10.0.0.1:4000", 12392), "10.0.0.1:4000");
        assert_eq!(normalize_peer("node.example", 1), "node.example:1");
        assert_eq!(split_host_port("host:x"), None);
        assert_eq!(split_host_port(":80"), None);
        assert_eq!(split_host_port("host:80"), Some(("host", 80)));
    }

    #[test]
    fn test_higher_score_connects_first() {
        let mut table = HashMap::new();
        table.insert("a:1".to_string(), stats(3, 0));
        table.insert("b:1".to_string(), stats(0, 3));

        let order = connection_order(&["b:1".to_string(), "a:1".to_string()], &table);
        assert_eq!(order, vec!["a:1", "b:1"]);
    }

    #[test]
    fn test_order_keeps_ties_and_drops_duplicates() {
        let mut table = HashMap::new();
        table.insert("c:1".to_string(), stats(1, 1));

        let candidates = ["x:1", "c:1", "y:1", "x:1"].map(String::from);
        let order = connection_order(&candidates, &table);
        assert_eq!(order, vec!["x:1", "c:1", "y:1"]);
    }

    #[test]
    fn test_recent_success_breaks_score_ties() {
        let mut table = HashMap::new();
        table.insert(
            "old:1".to_string(),
            PeerStats {
                successes: 2,
                failures: 1,
                last_success: Some(1_000),
                last_failure: None,
            },
        );
        table.insert(
            "new:1".to_string(),
            PeerStats {
                successes: 1,
                failures: 0,
                last_success: Some(2_000),
                last_failure: None,
            },
        );

        let order = connection_order(&["old:1".to_string(), "new:1".to_string()], &table);
        assert_eq!(order, vec!["new:1", "old:1"]);
    }

    #[test]
    fn test_height_tolerance() {
        let tolerance = Duration::from_secs(600);
        let tips = vec![tip("top", 103, 0), tip("lagging", 100, 0)];
        assert_eq!(lagging_peers(&tips, 2, tolerance), vec!["lagging"]);

        let tips = vec![tip("top", 102, 0), tip("close", 100, 0)];
        assert!(lagging_peers(&tips, 2, tolerance).is_empty());
    }

    #[test]
    fn test_time_tolerance() {
        let tips = vec![tip("fresh", 100, 1_000_000), tip("stale", 100, 1_000_000 - 600_001)];
        assert_eq!(
            lagging_peers(&tips, 5, Duration::from_secs(600)),
            vec!["stale"]
        );
    }

    #[test]
    fn test_no_tips_nothing_pruned() {
        assert!(lagging_peers(&[], 0, Duration::ZERO).is_empty());
    }

    #[test]
    fn test_best_peer_tie_break() {
        let tips = vec![tip("a", 10, 5), tip("b", 12, 1), tip("c", 12, 9)];
        assert_eq!(best_peer(&tips), Some("c"));
        assert_eq!(best_peer(&[]), None);
    }

    #[test]
    fn test_score() {
        assert_eq!(stats(3, 5).score(), -2);
    }
}
