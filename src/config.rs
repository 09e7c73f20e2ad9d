//! # Configuration Management
//!
//! Centralized configuration for the lite node client.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides (`QORTAL_LITE_*`) via `from_env()`
//!
//! ## Sections
//! - **peers**: seed list, connection cap, pruning tolerances, loop periods
//! - **client**: per-session timeouts, handshake identity, ping cache size
//! - **pow**: handshake difficulty and scratch arena sizing
//! - **logging**: subscriber settings

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Port assumed for peers listed without one
pub const DEFAULT_PORT: u16 = 12392;

/// Version string announced in HELLO
pub const DEFAULT_VERSION: &str = "qortal-5.0.2";

/// Node label announced in HELLO
pub const DEFAULT_NODE_LABEL: &str = "lite-node";

const ENV_PREFIX: &str = "QORTAL_LITE_";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LiteNodeConfig {
    #[serde(default)]
    pub peers: PeersConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub pow: PowConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LiteNodeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `QORTAL_LITE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    ///
    /// Unparseable numeric values are reported rather than ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(seeds) = var("SEED_PEERS") {
            self.peers.seed_peers = seeds
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("MAX_CONNECTIONS") {
            self.peers.max_connections = parse_env("MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = var("HEIGHT_TOLERANCE") {
            self.peers.height_tolerance = parse_env("HEIGHT_TOLERANCE", &v)?;
        }
        if let Some(v) = var("TIME_TOLERANCE_MS") {
            self.peers.time_tolerance = Duration::from_millis(parse_env("TIME_TOLERANCE_MS", &v)?);
        }
        if let Some(v) = var("DISCOVERY_ENABLED") {
            self.peers.discovery_enabled = parse_env("DISCOVERY_ENABLED", &v)?;
        }
        if let Some(v) = var("REQUEST_TIMEOUT_MS") {
            self.client.request_timeout = Duration::from_millis(parse_env("REQUEST_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = var("CONNECT_TIMEOUT_MS") {
            self.client.connect_timeout = Duration::from_millis(parse_env("CONNECT_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.logging.log_level = v
                .parse::<Level>()
                .map_err(|_| ProtocolError::ConfigError(format!("Invalid log level: {v}")))?;
        }

        Ok(())
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.peers.validate());
        errors.extend(self.client.validate());
        errors.extend(self.pow.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        ProtocolError::ConfigError(format!("Invalid value for {ENV_PREFIX}{name}: '{value}'"))
    })
}

/// Peer pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeersConfig {
    /// Initial peers, `host` or `host:port`
    pub seed_peers: Vec<String>,

    /// Port used for seed peers given without one
    pub default_port: u16,

    /// Upper bound on live sessions
    pub max_connections: usize,

    /// Blocks a peer may trail the best known height before it is pruned
    pub height_tolerance: i32,

    /// How far a peer's tip timestamp may trail the newest one
    #[serde(with = "duration_serde")]
    pub time_tolerance: Duration,

    #[serde(with = "duration_serde")]
    pub discovery_interval: Duration,

    #[serde(with = "duration_serde")]
    pub prune_interval: Duration,

    /// When false, sessions do not ask peers for their peer lists
    pub discovery_enabled: bool,
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            seed_peers: vec![String::from("127.0.0.1")],
            default_port: DEFAULT_PORT,
            max_connections: 10,
            height_tolerance: 3,
            time_tolerance: timeout::TIME_TOLERANCE,
            discovery_interval: timeout::DISCOVERY_INTERVAL,
            prune_interval: timeout::PRUNE_INTERVAL,
            discovery_enabled: true,
        }
    }
}

impl PeersConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.seed_peers.is_empty() {
            errors.push("At least one seed peer is required".to_string());
        }
        for peer in &self.seed_peers {
            if peer.trim().is_empty() {
                errors.push("Seed peer entries cannot be empty".to_string());
            } else if let Some((_, port)) = peer.rsplit_once(':') {
                if !peer.ends_with(']') && port.parse::<u16>().is_err() {
                    errors.push(format!("Invalid port in seed peer '{peer}'"));
                }
            }
        }

        if self.default_port == 0 {
            errors.push("Default port must be greater than 0".to_string());
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 1000 {
            errors.push(format!(
                "Max connections very high: {} (maximum: 1000)",
                self.max_connections
            ));
        }

        if self.height_tolerance < 0 {
            errors.push("Height tolerance cannot be negative".to_string());
        }

        if self.discovery_interval.as_millis() < 100 {
            errors.push("Discovery interval too short (minimum: 100ms)".to_string());
        }
        if self.prune_interval.as_millis() < 100 {
            errors.push("Prune interval too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Per-session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Timeout for the TCP connect
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Default wait for a request's reply
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Keepalive PING period once authenticated
    #[serde(with = "duration_serde")]
    pub ping_interval: Duration,

    /// Socket inactivity before the session is dropped
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    pub version: String,
    pub node_label: String,

    /// Recently echoed PING ids kept before the cache is cleared
    pub ping_cache_capacity: usize,

    /// Check the peer's RESPONSE hash against our challenge
    pub verify_response_hash: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: timeout::CONNECT_TIMEOUT,
            request_timeout: timeout::REQUEST_TIMEOUT,
            ping_interval: timeout::PING_INTERVAL,
            idle_timeout: timeout::IDLE_TIMEOUT,
            version: String::from(DEFAULT_VERSION),
            node_label: String::from(DEFAULT_NODE_LABEL),
            ping_cache_capacity: crate::utils::ping_cache::DEFAULT_CAPACITY,
            verify_response_hash: true,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connection timeout too long (maximum: 300s)".to_string());
        }

        if self.request_timeout.as_millis() < 10 {
            errors.push("Request timeout too short (minimum: 10ms)".to_string());
        }

        if self.ping_interval.as_millis() < 100 {
            errors.push("Ping interval too short (minimum: 100ms)".to_string());
        } else if self.ping_interval.as_secs() > 3600 {
            errors.push("Ping interval too long (maximum: 1 hour)".to_string());
        }

        if self.idle_timeout <= self.ping_interval {
            errors.push("Idle timeout must be longer than the ping interval".to_string());
        }

        if self.version.is_empty() {
            errors.push("Version string cannot be empty".to_string());
        }
        if self.node_label.is_empty() {
            errors.push("Node label cannot be empty".to_string());
        }

        if self.ping_cache_capacity == 0 {
            errors.push("Ping cache capacity must be greater than 0".to_string());
        }

        errors
    }
}

/// Proof-of-work configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PowConfig {
    /// Leading zero bits required beyond this many
    pub difficulty: u32,

    /// Work buffer length per computation
    pub work_buffer_len: usize,

    /// Total scratch arena size
    pub scratch_size: usize,

    /// Arena prefix never handed out
    pub scratch_reserved: usize,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            difficulty: crate::pow::HANDSHAKE_DIFFICULTY,
            work_buffer_len: crate::pow::DEFAULT_WORK_BUFFER_LEN,
            scratch_size: crate::pow::arena::DEFAULT_SCRATCH_SIZE,
            scratch_reserved: crate::pow::arena::DEFAULT_RESERVED,
        }
    }
}

impl PowConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.difficulty >= 64 {
            errors.push(format!("Difficulty {} can never be met (maximum: 63)", self.difficulty));
        }

        if self.work_buffer_len < 8 {
            errors.push("Work buffer must hold at least one 8-byte word".to_string());
        } else if self.work_buffer_len % 8 != 0 {
            errors.push("Work buffer length must be a multiple of 8".to_string());
        }

        if self.scratch_reserved > self.scratch_size {
            errors.push("Scratch reserve cannot exceed scratch size".to_string());
        } else if self.work_buffer_len + 32 > self.scratch_size - self.scratch_reserved {
            errors.push(format!(
                "Scratch region too small: {} usable bytes for a {} byte work buffer",
                self.scratch_size - self.scratch_reserved,
                self.work_buffer_len
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("qortal-lite-node"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
