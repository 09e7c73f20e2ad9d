//! # Qortal Lite Protocol
//!
//! Client side of the lite node peer-to-peer protocol: authenticated TCP
//! sessions exchanging checksummed frames, decoders for the node's query
//! responses, and a peer pool that keeps the best-synced peers connected.
//!
//! ## Layers
//! - [`core`]: wire envelope, message type codes, request payload builders
//! - [`messages`]: response payload decoders
//! - [`protocol`]: handshake state machine and request multiplexing
//! - [`pow`]: proof-of-work engine behind the handshake RESPONSE
//! - [`client`]: one session per peer
//! - [`peer`]: peer manager, discovery and pruning
//! - [`utils`]: keys, logging, metrics, timing
//!
//! ## Example Usage
//! ```rust,no_run
//! use qortal_lite_protocol::config::LiteNodeConfig;
//! use qortal_lite_protocol::peer::PeerManager;
//! use qortal_lite_protocol::utils::logging;
//!
//! # async fn run() -> qortal_lite_protocol::error::Result<()> {
//! let config = LiteNodeConfig::from_env()?;
//! logging::init(&config.logging)?;
//!
//! let manager = PeerManager::from_config(&config)?;
//! manager.initialize().await?;
//!
//! if let Some(client) = manager.get_best_client() {
//!     let name = client.primary_name("QgB7zMfujQMLkisp1Lc8PBkVYs75sYB3vV").await?;
//!     println!("{name:?}");
//! }
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod messages;
pub mod peer;
pub mod pow;
pub mod protocol;
pub mod utils;

pub use client::{Session, SessionContext};
pub use config::LiteNodeConfig;
pub use crate::core::{Frame, FrameCodec, MessageType};
pub use error::{DecodeError, ProtocolError, Result};
pub use messages::DecodedMessage;
pub use peer::{DiscoveredPeers, PeerManager, PeerRegistry};
pub use pow::PowEngine;
