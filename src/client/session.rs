//! One TCP connection to a lite node peer.
//!
//! A session owns three tasks:
//! - a reader draining the socket through [`FrameCodec`], dispatching frames
//!   in arrival order
//! - a writer flushing already-framed bytes from an unbounded FIFO
//! - a keepalive pinger, started once the handshake completes
//!
//! Handshake progress lives in [`Handshake`]; the nonce search for our
//! RESPONSE runs on the shared [`PowEngine`] without blocking the reader.
//! Every failure path funnels through a single disconnect routine that runs
//! once, rejects pending requests and notifies the [`PeerRegistry`].

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::core::codec::FrameCodec;
use crate::core::frame::Frame;
use crate::core::message_type::MessageType;
use crate::core::payloads;
use crate::error::{constants, DecodeError, ProtocolError, Result};
use crate::messages::{self, blocks, peers};
use crate::peer::{DiscoveredPeers, PeerRegistry};
use crate::pow::{PowEngine, HANDSHAKE_DIFFICULTY};
use crate::protocol::{Handshake, HandshakeState, PendingRequests};
use crate::utils::metrics::Metrics;
use crate::utils::ping_cache::PingCache;
use crate::utils::time::current_timestamp_millis;
use crate::utils::timeout::with_timeout;

/// Collaborators shared by every session of one client.
#[derive(Clone)]
pub struct SessionContext {
    pub config: ClientConfig,
    pub pow: Arc<PowEngine>,
    pub difficulty: u32,
    pub metrics: Arc<Metrics>,
    pub discovered: Arc<DiscoveredPeers>,
    pub registry: Option<Weak<dyn PeerRegistry>>,
    /// Request the peer list once authenticated
    pub discovery_enabled: bool,
}

impl SessionContext {
    pub fn new(config: ClientConfig, pow: Arc<PowEngine>) -> Self {
        Self {
            config,
            pow,
            difficulty: HANDSHAKE_DIFFICULTY,
            metrics: Arc::new(Metrics::new()),
            discovered: Arc::new(DiscoveredPeers::new()),
            registry: None,
            discovery_enabled: true,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_discovered(mut self, discovered: Arc<DiscoveredPeers>) -> Self {
        self.discovered = discovered;
        self
    }

    pub fn with_registry(mut self, registry: Weak<dyn PeerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_discovery(mut self, enabled: bool) -> Self {
        self.discovery_enabled = enabled;
        self
    }
}

struct PingState {
    /// Peer-initiated ids we already echoed
    echoed: PingCache,
    /// Ids of our own keepalives awaiting an echo
    outstanding: HashSet<u32>,
}

pub struct Session {
    host: String,
    port: u16,
    key: String,
    ctx: SessionContext,
    handshake: Mutex<Handshake>,
    requests: PendingRequests,
    pings: Mutex<PingState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    chain_tip: Mutex<Option<(i32, i64)>>,
    closed: AtomicBool,
    torn_down: AtomicBool,
    shutdown: CancellationToken,
    keepalive: CancellationToken,
}

impl Session {
    /// Connect to `host:port` and start the handshake.
    ///
    /// Returns once the socket is open and HELLO is queued; authentication
    /// completes in the background.
    ///
    /// # Errors
    /// - `ProtocolError::ConnectionTimeout` if the connect exceeds the configured timeout
    /// - `ProtocolError::Io` if the connection is refused
    #[instrument(skip(ctx))]
    pub async fn connect(host: &str, port: u16, ctx: SessionContext) -> Result<Arc<Self>> {
        let address = format!("{host}:{port}");
        let connect = async { TcpStream::connect(&address).await.map_err(ProtocolError::from) };

        match with_timeout(ctx.config.connect_timeout, connect).await {
            Ok(stream) => Self::from_stream(host, port, stream, ctx),
            Err(e) => {
                ctx.metrics.connection_error();
                warn!(peer = %address, error = %e, "Connection failed");
                Err(e)
            }
        }
    }

    /// Run the protocol over an already connected stream.
    pub fn from_stream(
        host: &str,
        port: u16,
        stream: TcpStream,
        ctx: SessionContext,
    ) -> Result<Arc<Self>> {
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let pings = PingState {
            echoed: PingCache::with_capacity(ctx.config.ping_cache_capacity),
            outstanding: HashSet::new(),
        };
        let session = Arc::new(Self {
            host: host.to_string(),
            port,
            key: format!("{host}:{port}"),
            handshake: Mutex::new(Handshake::new()?),
            requests: PendingRequests::new(),
            pings: Mutex::new(pings),
            outbound: Mutex::new(Some(tx)),
            chain_tip: Mutex::new(None),
            closed: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            keepalive: shutdown.child_token(),
            shutdown,
            ctx,
        });

        session.ctx.metrics.connection_established();
        session.ctx.metrics.handshake_attempt();

        tokio::spawn(write_loop(
            Arc::downgrade(&session),
            write_half,
            rx,
            session.shutdown.clone(),
            Arc::clone(&session.ctx.metrics),
        ));
        tokio::spawn(read_loop(
            Arc::downgrade(&session),
            read_half,
            FrameCodec::with_metrics(Arc::clone(&session.ctx.metrics)),
            session.ctx.config.idle_timeout,
            session.shutdown.clone(),
        ));

        let timestamp = current_timestamp_millis()?;
        let hello = session.handshake.lock().hello(
            timestamp,
            &session.ctx.config.version,
            &session.ctx.config.node_label,
        );
        session.send_message(MessageType::HELLO, hello)?;
        info!(peer = %session.key, "Session started");
        Ok(session)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> HandshakeState {
        self.handshake.lock().state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.handshake.lock().is_authenticated()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn last_known_block_height(&self) -> Option<i32> {
        self.chain_tip.lock().map(|(height, _)| height)
    }

    pub fn last_known_block_timestamp(&self) -> Option<i64> {
        self.chain_tip.lock().map(|(_, timestamp)| timestamp)
    }

    /// Last reported `(height, timestamp)`
    pub fn chain_tip(&self) -> Option<(i32, i64)> {
        *self.chain_tip.lock()
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.ctx.metrics
    }

    /// Queue a message under a fresh id and return that id.
    ///
    /// # Errors
    /// Returns `ProtocolError::NotConnected` once the session is closing.
    pub fn send_message(&self, message_type: MessageType, payload: impl Into<Bytes>) -> Result<u32> {
        let id = self.requests.next_id();
        self.send_with_id(message_type, id, payload.into())?;
        Ok(id)
    }

    /// Queue a message under a caller-chosen id.
    pub fn send_with_id(&self, message_type: MessageType, id: u32, payload: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::NotConnected);
        }
        let frame = Frame::new(message_type.code(), Some(id), payload).to_bytes();

        let outbound = self.outbound.lock();
        let sender = outbound.as_ref().ok_or(ProtocolError::NotConnected)?;
        sender.send(frame).map_err(|_| ProtocolError::NotConnected)?;
        debug!(peer = %self.key, %message_type, id, "Queued message");
        Ok(())
    }

    /// Send a request and wait for the frame echoing its id.
    ///
    /// `timeout` defaults to the configured request timeout.
    ///
    /// # Errors
    /// - `ProtocolError::RequestTimeout` if no reply arrived in time
    /// - `ProtocolError::Disconnected` if the session closed first
    /// - `ProtocolError::NotConnected` if the session was already closed
    pub async fn send_request(
        &self,
        message_type: MessageType,
        payload: impl Into<Bytes>,
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        let id = self.requests.next_id();
        let rx = self.requests.register(id)?;
        if let Err(e) = self.send_with_id(message_type, id, payload.into()) {
            self.requests.remove(id);
            return Err(e);
        }

        let timeout = timeout.unwrap_or(self.ctx.config.request_timeout);
        let result = self.requests.wait(id, rx, timeout).await;
        if let Err(ProtocolError::RequestTimeout { .. }) = &result {
            self.ctx.metrics.request_timeout();
            warn!(peer = %self.key, %message_type, id, ?timeout, "Request timed out");
        }
        result
    }

    /// Close gracefully.
    ///
    /// Pending requests are rejected and keepalives stop before this returns.
    /// Frames already queued are still flushed before the write side shuts down.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.keepalive.cancel();
        self.outbound.lock().take();
        let rejected = self.requests.reject_all();
        debug!(peer = %self.key, rejected, "Closing session");
    }

    /// Tear the connection down immediately.
    pub fn destroy(&self) {
        self.handle_disconnect("Session destroyed", false);
    }

    fn registry(&self) -> Option<Arc<dyn PeerRegistry>> {
        self.ctx.registry.as_ref().and_then(Weak::upgrade)
    }

    /// Runs once per session, whichever path gets here first.
    fn handle_disconnect(&self, reason: &str, penalize: bool) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
        self.outbound.lock().take();

        let rejected = self.requests.reject_all();
        self.ctx.metrics.connection_closed();
        info!(peer = %self.key, reason, rejected, "Session closed");

        if let Some(registry) = self.registry() {
            registry.remove_peer(&self.key);
            if penalize {
                registry.update_peer_stats(&self.key, false);
            }
        }
    }

    fn fail_handshake(&self, error: &ProtocolError) {
        warn!(peer = %self.key, error = %error, "Handshake failed");
        self.ctx.metrics.handshake_failed();
        self.handle_disconnect(&error.to_string(), true);
    }

    fn handle_frame(self: &Arc<Self>, frame: Frame) {
        if let Some(id) = frame.id {
            if self.requests.resolve(id, frame.payload.clone()) {
                return;
            }
        }

        let Some(message_type) = MessageType::from_code(frame.message_type) else {
            debug!(peer = %self.key, code = frame.message_type, "Ignoring unknown message type");
            return;
        };

        match message_type {
            MessageType::HELLO => self.on_hello(),
            MessageType::CHALLENGE => self.on_challenge(&frame.payload),
            MessageType::RESPONSE => self.on_response(&frame.payload),
            MessageType::PING => self.on_ping(frame.id),
            MessageType::GOODBYE => {
                info!(peer = %self.key, "Peer said goodbye");
                self.close();
            }
            MessageType::PEERS_V2 => self.on_peers(&frame.payload),
            MessageType::BLOCK_SUMMARIES_V2 => {
                match blocks::decode_block_summaries_v2(&frame.payload) {
                    Ok(summaries) => {
                        if let Some((height, timestamp)) = blocks::latest_tip(&summaries) {
                            self.update_chain_tip(height, timestamp);
                        }
                    }
                    Err(e) => self.log_decode_failure(message_type, &e),
                }
            }
            MessageType::HEIGHT_V2 => match blocks::decode_height_v2(&frame.payload) {
                Ok(tip) => self.update_chain_tip(tip.height, tip.timestamp),
                Err(e) => self.log_decode_failure(message_type, &e),
            },
            other => {
                if let Some(decoded) = messages::decode_payload(other, &frame.payload) {
                    debug!(peer = %self.key, message = ?decoded, "Unsolicited message");
                }
            }
        }
    }

    fn log_decode_failure(&self, message_type: MessageType, error: &DecodeError) {
        self.ctx.metrics.decode_error();
        warn!(peer = %self.key, %message_type, error = %error, "Discarding malformed payload");
    }

    fn on_hello(&self) {
        let challenge = self.handshake.lock().on_hello();
        if let Some(payload) = challenge {
            if let Err(e) = self.send_message(MessageType::CHALLENGE, payload) {
                debug!(peer = %self.key, error = %e, "Unable to send CHALLENGE");
            }
        }
    }

    fn on_challenge(self: &Arc<Self>, payload: &[u8]) {
        let outcome = self.handshake.lock().on_challenge(payload);
        let hash = match outcome {
            Ok(Some(hash)) => hash,
            Ok(None) => return,
            Err(e) => {
                self.fail_handshake(&e);
                return;
            }
        };

        let session = Arc::downgrade(self);
        let pow = Arc::clone(&self.ctx.pow);
        let difficulty = self.ctx.difficulty;
        tokio::spawn(async move {
            let result = pow.compute(&hash, difficulty).await;
            let Some(session) = session.upgrade() else {
                debug!("Session dropped before its nonce was ready");
                return;
            };
            match result {
                Ok(nonce) if !session.is_closed() => {
                    if let Err(e) =
                        session.send_message(MessageType::RESPONSE, payloads::response(nonce, &hash))
                    {
                        debug!(peer = %session.key, error = %e, "Unable to send RESPONSE");
                    }
                }
                Ok(_) => debug!(peer = %session.key, "Discarding nonce for closed session"),
                Err(e) => session.fail_handshake(&e),
            }
        });
    }

    fn on_response(self: &Arc<Self>, payload: &[u8]) {
        let verify = self.ctx.config.verify_response_hash;
        let outcome = self.handshake.lock().on_response(payload, verify);
        match outcome {
            Ok(true) => self.on_authenticated(),
            Ok(false) => debug!(peer = %self.key, "Ignoring repeated RESPONSE"),
            Err(e) => self.fail_handshake(&e),
        }
    }

    fn on_authenticated(self: &Arc<Self>) {
        self.ctx.metrics.handshake_success();
        info!(peer = %self.key, "Handshake complete");

        if let Some(registry) = self.registry() {
            registry.register(Arc::clone(self));
            registry.update_peer_stats(&self.key, true);
        }

        tokio::spawn(ping_loop(
            Arc::downgrade(self),
            self.ctx.config.ping_interval,
            self.keepalive.clone(),
        ));

        if self.ctx.discovery_enabled {
            if let Err(e) = self.send_message(MessageType::GET_PEERS, payloads::empty_marker()) {
                debug!(peer = %self.key, error = %e, "Unable to request peers");
            }
        }
    }

    fn on_ping(&self, id: Option<u32>) {
        let Some(id) = id else {
            return;
        };
        {
            let mut pings = self.pings.lock();
            if pings.outstanding.remove(&id) {
                debug!(peer = %self.key, id, "Keepalive answered");
                return;
            }
            if !pings.echoed.insert(id) {
                return;
            }
        }
        if let Err(e) = self.send_with_id(MessageType::PING, id, payloads::empty_marker()) {
            debug!(peer = %self.key, error = %e, "Unable to echo PING");
        }
    }

    fn send_keepalive(&self) {
        let id = self.requests.next_id();
        {
            let mut pings = self.pings.lock();
            if pings.outstanding.len() >= self.ctx.config.ping_cache_capacity {
                pings.outstanding.clear();
            }
            pings.outstanding.insert(id);
        }
        if let Err(e) = self.send_with_id(MessageType::PING, id, payloads::empty_marker()) {
            debug!(peer = %self.key, error = %e, "Unable to send keepalive");
        }
    }

    fn on_peers(&self, payload: &[u8]) {
        match peers::decode_peers_v2(payload) {
            Ok(addresses) => {
                let received = addresses.len();
                let added = self.ctx.discovered.extend(addresses);
                debug!(peer = %self.key, received, added, "Peer list received");
            }
            Err(e) => self.log_decode_failure(MessageType::PEERS_V2, &e),
        }
    }

    fn update_chain_tip(&self, height: i32, timestamp: i64) {
        *self.chain_tip.lock() = Some((height, timestamp));
        debug!(peer = %self.key, height, timestamp, "Chain tip updated");
        if let Some(registry) = self.registry() {
            registry.update_peer_chain_tip(&self.key, height, timestamp);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .field("chain_tip", &self.chain_tip())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.torn_down.swap(true, Ordering::SeqCst) {
            self.shutdown.cancel();
            self.ctx.metrics.connection_closed();
        }
    }
}

async fn read_loop(
    session: Weak<Session>,
    read_half: OwnedReadHalf,
    codec: FrameCodec,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut frames = FramedRead::new(read_half, codec);

    let reason = loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return,
            next = tokio::time::timeout(idle_timeout, frames.next()) => next,
        };
        match next {
            Err(_) => break constants::ERR_IDLE_TIMEOUT.to_string(),
            Ok(None) => break constants::ERR_CONNECTION_CLOSED.to_string(),
            Ok(Some(Err(e))) => break e.to_string(),
            Ok(Some(Ok(frame))) => match session.upgrade() {
                Some(session) => session.handle_frame(frame),
                None => return,
            },
        }
    };

    if let Some(session) = session.upgrade() {
        // The peer hanging up after we closed is not held against it
        let penalize = !session.is_closed();
        session.handle_disconnect(&reason, penalize);
    }
}

async fn write_loop(
    session: Weak<Session>,
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    shutdown: CancellationToken,
    metrics: Arc<Metrics>,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return,
            next = outbound.recv() => next,
        };
        let Some(bytes) = next else {
            // Sender dropped by close(): everything queued has been written
            let _ = write_half.shutdown().await;
            if let Some(session) = session.upgrade() {
                session.handle_disconnect("Closed locally", false);
            }
            return;
        };

        if let Err(e) = write_half.write_all(&bytes).await {
            if let Some(session) = session.upgrade() {
                session.handle_disconnect(&e.to_string(), true);
            }
            return;
        }
        metrics.message_sent(bytes.len() as u64);
    }
}

async fn ping_loop(session: Weak<Session>, period: Duration, shutdown: CancellationToken) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        match session.upgrade() {
            Some(session) => session.send_keepalive(),
            None => return,
        }
    }
}
