//! # Utility Modules
//!
//! Supporting utilities for key conversion, logging, timing and observability.
//!
//! ## Components
//! - **Keys**: Ed25519 seed to X25519 key agreement material
//! - **Logging**: Structured logging configuration
//! - **Time**: Millisecond timestamps and lag checks
//! - **Timeout**: Default timings and async timeout wrappers
//! - **Ping Cache**: Bounded set of PING ids already echoed
//! - **Metrics**: Thread-safe observability counters
//!
//! ## Security
//! - Cryptographically secure RNG (getrandom)
//! - Memory zeroing for sensitive data (zeroize crate)

pub mod keys;
pub mod logging;
pub mod metrics;
pub mod ping_cache;
pub mod time;
pub mod timeout;

pub use keys::LocalKeys;
pub use metrics::{Metrics, MetricsSnapshot};
pub use ping_cache::PingCache;
