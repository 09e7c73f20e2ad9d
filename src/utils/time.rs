//! Wall-clock helpers for protocol timestamps (milliseconds since the epoch).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{constants, ProtocolError, Result};

/// Current time in milliseconds since the Unix epoch.
pub fn current_timestamp_millis() -> Result<i64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .map_err(|_| ProtocolError::Custom(constants::ERR_SYSTEM_TIME.to_string()))
}

/// Milliseconds by which `timestamp` trails `reference`, zero if it is ahead.
pub fn lag_millis(reference: i64, timestamp: i64) -> u64 {
    reference.saturating_sub(timestamp).max(0) as u64
}

/// True when `timestamp` trails `reference` by more than `tolerance`.
pub fn lags_beyond(reference: i64, timestamp: i64, tolerance: Duration) -> bool {
    u128::from(lag_millis(reference, timestamp)) > tolerance.as_millis()
}
