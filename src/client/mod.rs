//! # Client Sessions
//!
//! One authenticated connection per peer, plus typed request helpers.
//!
//! ## Components
//! - **Session**: socket tasks, handshake driver, request multiplexing, keepalive
//! - **Api**: GET_* requests decoded into domain records
//!
//! ## Example Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use qortal_lite_protocol::client::{Session, SessionContext};
//! use qortal_lite_protocol::config::LiteNodeConfig;
//! use qortal_lite_protocol::pow::PowEngine;
//!
//! # async fn run() -> qortal_lite_protocol::error::Result<()> {
//! let config = LiteNodeConfig::default();
//! let pow = Arc::new(PowEngine::from_config(&config.pow)?);
//! let ctx = SessionContext::new(config.client.clone(), pow);
//!
//! let session = Session::connect("127.0.0.1", 12392, ctx).await?;
//! let fee = session.unit_fee("PAYMENT", None).await?;
//! println!("unit fee: {fee}");
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod session;

pub use api::Paging;
pub use session::{Session, SessionContext};
