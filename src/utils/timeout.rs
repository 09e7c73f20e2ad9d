//! Default timing constants and an async timeout wrapper.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// TCP connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait for a request's reply
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Keepalive PING period once authenticated
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Socket inactivity before the session is torn down
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(60);
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(30);

/// Reported chain tips older than the cluster max by more than this are stale
pub const TIME_TOLERANCE: Duration = Duration::from_secs(10 * 60);

/// Run `fut` with a deadline, mapping expiry to [`ProtocolError::ConnectionTimeout`].
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::ConnectionTimeout),
    }
}
