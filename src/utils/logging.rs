//! Structured logging setup
//!
//! Installs a global `tracing` subscriber from a [`LoggingConfig`]. `RUST_LOG`
//! takes precedence over the configured level when it is set.

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

/// Install the global subscriber.
///
/// Fails (without panicking) if a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let level = config.log_level.to_string().to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json_format {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| ProtocolError::ConfigError(format!("Logging already initialised: {e}")))?;
    info!(app = %config.app_name, json = config.json_format, "Logging initialised");
    Ok(())
}
