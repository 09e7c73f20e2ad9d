//! # Session Protocol
//!
//! Handshake state machine and request multiplexing for a single peer link.
//!
//! ## Components
//! - **Handshake**: HELLO / CHALLENGE / RESPONSE exchange and its monotonic state
//! - **Requests**: message id allocation and one-shot response waiters
//!
//! ## Handshake Flow
//! ```text
//! us                          peer
//!  |-- HELLO ------------------>|
//!  |<------------------ HELLO --|
//!  |-- CHALLENGE(pk, c1) ------>|
//!  |<------ CHALLENGE(pk, c2) --|
//!  |-- RESPONSE(pow, h2) ------>|   h2 = SHA256(shared || c2)
//!  |<------ RESPONSE(pow, h1) --|   h1 = SHA256(shared || c1)
//! ```

pub mod handshake;
pub mod requests;


pub use handshake::{Handshake, HandshakeState};
pub use requests::PendingRequests;
