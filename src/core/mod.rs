//! # Core Wire Format
//!
//! Framing, message type codes and outbound payload builders.
//!
//! ## Components
//! - **Frame**: envelope encode/parse with checksum and resynchronisation
//! - **Codec**: `tokio_util` codec draining a receive buffer frame by frame
//! - **Message Type**: known type codes
//! - **Payloads**: handshake and GET_* request payloads

pub mod codec;
pub mod frame;
pub mod message_type;
pub mod payloads;

pub use codec::FrameCodec;
pub use frame::{Frame, Parsed};
pub use message_type::MessageType;
