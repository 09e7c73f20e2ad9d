//! Scripted remote node shared by the integration tests

#![allow(dead_code, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use qortal_lite_protocol::core::{payloads, Frame, FrameCodec, MessageType};
use qortal_lite_protocol::pow::{PowEngine, ScratchArena};
use qortal_lite_protocol::protocol::Handshake;
use qortal_lite_protocol::utils::keys::LocalKeys;
use qortal_lite_protocol::Session;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

pub const STEP: Duration = Duration::from_secs(5);

/// Engine small enough to find difficulty-2 nonces instantly
pub fn small_pow() -> Arc<PowEngine> {
    let arena = ScratchArena::new(64 * 1024, 0).expect("arena");
    Arc::new(PowEngine::new(Arc::new(arena), 8 * 1024))
}

/// HEIGHT_V2 payload
pub fn height_v2(height: i32, timestamp: i64) -> Vec<u8> {
    let mut payload = height.to_be_bytes().to_vec();
    payload.extend_from_slice(&[0x01; 64]);
    payload.extend_from_slice(&timestamp.to_be_bytes());
    payload.extend_from_slice(&[0x02; 32]);
    payload
}

pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(STEP, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

pub struct MockPeer {
    pub frames: Framed<TcpStream, FrameCodec>,
    pub handshake: Handshake,
    /// Frames passed over by `recv_type`, oldest first
    backlog: VecDeque<Frame>,
    next_id: u32,
}

impl MockPeer {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            frames: Framed::new(stream, FrameCodec::new()),
            handshake: Handshake::with_identity(LocalKeys::from_seed([0x42; 32]), [0x24; 32]),
            backlog: VecDeque::new(),
            // Well clear of the ids the session allocates
            next_id: 10_000,
        }
    }

    pub async fn recv(&mut self) -> Frame {
        if let Some(frame) = self.backlog.pop_front() {
            return frame;
        }
        self.recv_wire().await
    }

    async fn recv_wire(&mut self) -> Frame {
        tokio::time::timeout(STEP, self.frames.next())
            .await
            .expect("peer timed out waiting for a frame")
            .expect("stream ended")
            .expect("valid frame")
    }

    /// Next frame of `message_type`. Other frames are kept for later calls.
    pub async fn recv_type(&mut self, message_type: MessageType) -> Frame {
        let code = message_type.code();
        if let Some(at) = self.backlog.iter().position(|f| f.message_type == code) {
            return self.backlog.remove(at).expect("position is in range");
        }
        loop {
            let frame = self.recv_wire().await;
            if frame.message_type == code {
                return frame;
            }
            self.backlog.push_back(frame);
        }
    }

    pub async fn send(&mut self, message_type: MessageType, payload: impl Into<Bytes>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.send_with_id(message_type, id, payload).await;
        id
    }

    pub async fn send_with_id(&mut self, message_type: MessageType, id: u32, payload: impl Into<Bytes>) {
        self.frames
            .send(Frame::new(message_type.code(), Some(id), payload))
            .await
            .expect("send frame");
    }

    /// Answer the session's HELLO and send our CHALLENGE; returns once the
    /// session's CHALLENGE is processed and the hash for our RESPONSE is known.
    pub async fn exchange_challenges(&mut self) -> [u8; 32] {
        self.recv_type(MessageType::HELLO).await;
        let hello = self.handshake.hello(1_700_000_000_000, "qortal-5.0.2", "mock");
        self.send(MessageType::HELLO, hello).await;
        let challenge = self.handshake.on_hello().expect("first HELLO");
        self.send(MessageType::CHALLENGE, challenge).await;

        let their_challenge = self.recv_type(MessageType::CHALLENGE).await;
        self.handshake
            .on_challenge(&their_challenge.payload)
            .expect("session challenge is valid")
            .expect("first challenge")
    }

    /// Run the whole handshake and wait for the session to authenticate.
    pub async fn authenticate(&mut self, session: &Session) {
        let hash = self.exchange_challenges().await;
        self.send(MessageType::RESPONSE, payloads::response(0, &hash)).await;

        let response = self.recv_type(MessageType::RESPONSE).await;
        assert!(self
            .handshake
            .on_response(&response.payload, true)
            .expect("session RESPONSE echoes our challenge hash"));

        wait_until(|| session.is_authenticated()).await;
    }
}
