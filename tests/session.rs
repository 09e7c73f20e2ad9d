//! Session integration tests against a scripted peer on a loopback socket

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use common::{height_v2, small_pow, wait_until, MockPeer, STEP};
use futures::StreamExt;
use parking_lot::Mutex;
use qortal_lite_protocol::config::ClientConfig;
use qortal_lite_protocol::core::{payloads, MessageType};
use qortal_lite_protocol::peer::PeerRegistry;
use qortal_lite_protocol::protocol::HandshakeState;
use qortal_lite_protocol::{ProtocolError, Session, SessionContext};
use tokio::net::TcpListener;

#[derive(Default)]
struct RecordingRegistry {
    events: Mutex<Vec<String>>,
}

impl RecordingRegistry {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl PeerRegistry for RecordingRegistry {
    fn register(&self, session: Arc<Session>) {
        self.events.lock().push(format!("register {}", session.key()));
    }

    fn remove_peer(&self, key: &str) {
        self.events.lock().push(format!("remove {key}"));
    }

    fn update_peer_stats(&self, key: &str, success: bool) {
        self.events.lock().push(format!("stats {key} {success}"));
    }

    fn update_peer_chain_tip(&self, key: &str, height: i32, timestamp: i64) {
        self.events.lock().push(format!("tip {key} {height} {timestamp}"));
    }
}

fn context() -> SessionContext {
    let config = ClientConfig {
        request_timeout: Duration::from_secs(2),
        ping_interval: Duration::from_secs(60),
        idle_timeout: Duration::from_secs(120),
        ..ClientConfig::default()
    };
    SessionContext::new(config, small_pow()).with_discovery(false)
}

async fn connect(ctx: SessionContext) -> (Arc<Session>, MockPeer) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();

    let session = Session::connect("127.0.0.1", port, ctx).await.expect("connect");
    let (stream, _) = listener.accept().await.expect("accept");
    (session, MockPeer::new(stream))
}

async fn authenticated(ctx: SessionContext) -> (Arc<Session>, MockPeer) {
    let (session, mut peer) = connect(ctx).await;
    peer.authenticate(&session).await;
    (session, peer)
}

#[tokio::test]
async fn test_handshake_authenticates_and_registers() {
    let registry = Arc::new(RecordingRegistry::default());
    let as_registry: Arc<dyn PeerRegistry> = registry.clone();
    let weak: Weak<dyn PeerRegistry> = Arc::downgrade(&as_registry);

    let (session, _peer) = authenticated(context().with_registry(weak)).await;

    assert_eq!(session.state(), HandshakeState::Authenticated);
    let key = session.key().to_string();
    wait_until(|| registry.events().len() >= 2).await;
    assert_eq!(
        registry.events(),
        vec![format!("register {key}"), format!("stats {key} true")]
    );

    let snapshot = session.metrics().snapshot();
    assert_eq!(snapshot.handshakes_success, 1);
    assert_eq!(snapshot.handshakes_failed, 0);
    assert_eq!(snapshot.pow_computations, 0, "engine has no metrics attached");
}

#[tokio::test]
async fn test_bad_response_hash_fails_handshake() {
    let registry = Arc::new(RecordingRegistry::default());
    let as_registry: Arc<dyn PeerRegistry> = registry.clone();
    let (session, mut peer) = connect(context().with_registry(Arc::downgrade(&as_registry))).await;

    peer.exchange_challenges().await;
    peer.send(MessageType::RESPONSE, payloads::response(0, &[0xEE; 32])).await;

    let key = session.key().to_string();
    wait_until(|| registry.events().contains(&format!("stats {key} false"))).await;
    assert!(session.is_closed());
    assert!(!session.is_authenticated());
    assert_eq!(session.metrics().snapshot().handshakes_failed, 1);
    assert!(registry.events().contains(&format!("remove {key}")));
}

#[tokio::test]
async fn test_concurrent_requests_resolved_by_id() {
    let (session, mut peer) = authenticated(context()).await;

    let first = Arc::clone(&session);
    let a = tokio::spawn(async move {
        first
            .send_request(MessageType::GET_NAME, Bytes::from_static(b"a"), None)
            .await
    });
    let second = Arc::clone(&session);
    let b = tokio::spawn(async move {
        second
            .send_request(MessageType::GET_NAME, Bytes::from_static(b"b"), None)
            .await
    });

    let mut ids = std::collections::HashMap::new();
    for _ in 0..2 {
        let frame = peer.recv_type(MessageType::GET_NAME).await;
        ids.insert(frame.payload.clone(), frame.id.expect("requests carry an id"));
    }
    let id_a = ids[&Bytes::from_static(b"a")];
    let id_b = ids[&Bytes::from_static(b"b")];
    assert_ne!(id_a, id_b);

    // Reply out of order, then repeat one reply
    peer.send_with_id(MessageType::NAMES, id_b, Bytes::from_static(b"reply-b")).await;
    peer.send_with_id(MessageType::NAMES, id_a, Bytes::from_static(b"reply-a")).await;
    peer.send_with_id(MessageType::NAMES, id_a, Bytes::from_static(b"late")).await;

    assert_eq!(a.await.unwrap().unwrap(), Bytes::from_static(b"reply-a"));
    assert_eq!(b.await.unwrap().unwrap(), Bytes::from_static(b"reply-b"));
    assert_eq!(session.pending_requests(), 0);
    assert!(!session.is_closed());
}

#[tokio::test]
async fn test_request_timeout_leaves_session_usable() {
    let (session, mut peer) = authenticated(context()).await;

    let err = session
        .send_request(
            MessageType::GET_ACCOUNT,
            Bytes::from_static(b"x"),
            Some(Duration::from_millis(50)),
        )
        .await
        .expect_err("no reply was sent");
    let ProtocolError::RequestTimeout { id: expired } = err else {
        panic!("expected a timeout, got {err:?}");
    };
    assert_eq!(session.pending_requests(), 0);
    assert_eq!(session.metrics().snapshot().request_timeouts, 1);

    let stale = peer.recv_type(MessageType::GET_ACCOUNT).await;
    assert_eq!(stale.id, Some(expired));
    // A late reply for the expired id is dropped
    peer.send_with_id(MessageType::ACCOUNT, expired, Bytes::from_static(b"late")).await;

    let responder = async {
        let frame = peer.recv_type(MessageType::GET_ACCOUNT).await;
        peer.send_with_id(MessageType::ACCOUNT, frame.id.unwrap(), Bytes::from_static(b"ok"))
            .await;
    };
    let (reply, ()) = tokio::join!(
        session.send_request(MessageType::GET_ACCOUNT, Bytes::from_static(b"y"), None),
        responder
    );
    assert_eq!(reply.unwrap(), Bytes::from_static(b"ok"));
    assert!(!session.is_closed());
}

#[tokio::test]
async fn test_ping_echoed_once_per_id() {
    let (_session, mut peer) = authenticated(context()).await;

    peer.send_with_id(MessageType::PING, 5_000, payloads::empty_marker()).await;
    let echo = peer.recv_type(MessageType::PING).await;
    assert_eq!(echo.id, Some(5_000));

    // Repeat of an echoed id is swallowed; the next new id is answered
    peer.send_with_id(MessageType::PING, 5_000, payloads::empty_marker()).await;
    peer.send_with_id(MessageType::PING, 5_001, payloads::empty_marker()).await;
    let echo = peer.recv_type(MessageType::PING).await;
    assert_eq!(echo.id, Some(5_001));
}

#[tokio::test]
async fn test_keepalive_sent_after_authentication() {
    let mut ctx = context();
    ctx.config.ping_interval = Duration::from_millis(50);
    let (session, mut peer) = authenticated(ctx).await;

    let ping = peer.recv_type(MessageType::PING).await;
    // Echo it back: the session recognises its own keepalive and stays quiet
    peer.send_with_id(MessageType::PING, ping.id.unwrap(), payloads::empty_marker()).await;

    let next = peer.recv_type(MessageType::PING).await;
    assert_ne!(next.id, ping.id);
    assert!(!session.is_closed());
}

#[tokio::test]
async fn test_goodbye_closes_session() {
    let (session, mut peer) = authenticated(context()).await;

    peer.send(MessageType::GOODBYE, payloads::empty_marker()).await;
    wait_until(|| session.is_closed()).await;

    // The session shut its write side after flushing
    let end = tokio::time::timeout(STEP, peer.frames.next()).await.expect("eof");
    assert!(end.is_none());
    assert!(matches!(
        session.send_message(MessageType::PING, payloads::empty_marker()),
        Err(ProtocolError::NotConnected)
    ));
}

#[tokio::test]
async fn test_height_updates_chain_tip() {
    let registry = Arc::new(RecordingRegistry::default());
    let as_registry: Arc<dyn PeerRegistry> = registry.clone();
    let (session, mut peer) = authenticated(context().with_registry(Arc::downgrade(&as_registry))).await;
    assert_eq!(session.chain_tip(), None);

    peer.send(MessageType::HEIGHT_V2, height_v2(1_500_000, 1_700_000_123_456)).await;

    wait_until(|| session.chain_tip().is_some()).await;
    assert_eq!(session.last_known_block_height(), Some(1_500_000));
    assert_eq!(session.last_known_block_timestamp(), Some(1_700_000_123_456));
    assert!(registry
        .events()
        .contains(&format!("tip {} 1500000 1700000123456", session.key())));

    // A malformed update is dropped without touching the tip or the session
    peer.send(MessageType::HEIGHT_V2, vec![0u8; 10]).await;
    wait_until(|| session.metrics().snapshot().decode_errors == 1).await;
    assert_eq!(session.last_known_block_height(), Some(1_500_000));
    assert!(!session.is_closed());
}

#[tokio::test]
async fn test_peer_list_recorded_after_handshake() {
    let ctx = context().with_discovery(true);
    let discovered = Arc::clone(&ctx.discovered);
    let (_session, mut peer) = authenticated(ctx).await;

    peer.recv_type(MessageType::GET_PEERS).await;

    let mut list = 3i32.to_be_bytes().to_vec();
    for address in ["10.1.1.1:12392", "10.1.1.2:12392"] {
        list.push(address.len() as u8);
        list.extend_from_slice(address.as_bytes());
    }
    // Cut short: the first two entries still count
    list.push(30);
    list.extend_from_slice(b"10.1.1.3");
    peer.send(MessageType::PEERS_V2, list).await;

    wait_until(|| discovered.len() == 2).await;
    assert!(discovered.contains("10.1.1.1:12392"));
}

#[tokio::test]
async fn test_remote_disconnect_rejects_pending_requests() {
    let registry = Arc::new(RecordingRegistry::default());
    let as_registry: Arc<dyn PeerRegistry> = registry.clone();
    let (session, mut peer) = authenticated(context().with_registry(Arc::downgrade(&as_registry))).await;

    let waiting = Arc::clone(&session);
    let request = tokio::spawn(async move {
        waiting
            .send_request(
                MessageType::GET_GROUP,
                Bytes::from_static(&[0, 0, 0, 1]),
                Some(Duration::from_secs(30)),
            )
            .await
    });
    peer.recv_type(MessageType::GET_GROUP).await;
    drop(peer);

    let err = request.await.unwrap().expect_err("peer went away");
    assert!(matches!(err, ProtocolError::Disconnected { .. }), "{err:?}");
    assert!(session.is_closed());

    let key = session.key().to_string();
    wait_until(|| registry.events().contains(&format!("stats {key} false"))).await;
    assert!(registry.events().contains(&format!("remove {key}")));
}

#[tokio::test]
async fn test_close_rejects_pending_requests_immediately() {
    let registry = Arc::new(RecordingRegistry::default());
    let as_registry: Arc<dyn PeerRegistry> = registry.clone();
    let (session, mut peer) = authenticated(context().with_registry(Arc::downgrade(&as_registry))).await;

    let waiting = Arc::clone(&session);
    let request = tokio::spawn(async move {
        waiting
            .send_request(MessageType::GET_ACCOUNT, Bytes::from_static(b"x"), Some(Duration::from_secs(30)))
            .await
    });
    peer.recv_type(MessageType::GET_ACCOUNT).await;
    assert_eq!(session.pending_requests(), 1);

    session.close();
    assert!(session.is_closed());
    assert_eq!(session.pending_requests(), 0);
    assert!(matches!(
        session.send_message(MessageType::PING, payloads::empty_marker()),
        Err(ProtocolError::NotConnected)
    ));

    let err = tokio::time::timeout(STEP, request)
        .await
        .expect("waiter released")
        .unwrap()
        .expect_err("closed before any reply");
    assert!(matches!(err, ProtocolError::Disconnected { .. }), "{err:?}");

    // The write side is shut down once the queue drains; a local close is not a failure
    let key = session.key().to_string();
    wait_until(|| registry.events().contains(&format!("remove {key}"))).await;
    assert!(!registry.events().contains(&format!("stats {key} false")));
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let ctx = context();
    let metrics = Arc::clone(&ctx.metrics);
    assert!(Session::connect("127.0.0.1", port, ctx).await.is_err());
    assert_eq!(metrics.snapshot().connection_errors, 1);
}
