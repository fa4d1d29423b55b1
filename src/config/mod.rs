//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default interval between resends of an unanswered request
pub const DEFAULT_RESEND_INTERVAL: Duration = Duration::from_millis(500);

/// Default interval between connection state polls
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Default deadline for a single request/response exchange
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for connecting and disconnecting
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing knobs of one tunneling connection
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait before repeating an unanswered request
    pub resend_interval: Duration,
    /// How often the gateway's connection state is polled
    pub heartbeat_interval: Duration,
    /// Upper bound on a single request/response exchange
    pub response_timeout: Duration,
    /// Upper bound on the connect and disconnect handshakes
    pub connection_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            resend_interval: DEFAULT_RESEND_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Replace zero durations with their defaults
    ///
    /// A zero resend interval would busy-loop the resend timer, a zero
    /// timeout could never be met; both are treated as "unset".
    pub fn sanitized(mut self) -> Self {
        if self.resend_interval.is_zero() {
            self.resend_interval = DEFAULT_RESEND_INTERVAL;
        }
        if self.heartbeat_interval.is_zero() {
            self.heartbeat_interval = DEFAULT_HEARTBEAT_INTERVAL;
        }
        if self.response_timeout.is_zero() {
            self.response_timeout = DEFAULT_RESPONSE_TIMEOUT;
        }
        if self.connection_timeout.is_zero() {
            self.connection_timeout = DEFAULT_CONNECTION_TIMEOUT;
        }
        self
    }
}

/// Main configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gateway to connect to
    pub gateway: GatewayConfig,
    /// Connection timing configuration
    pub timings: TimingConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Read a configuration file; missing sections fall back to defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| crate::Error::Config(format!("cannot read {}: {}", path.as_ref().display(), e)))?;

        toml::from_str(&raw)
            .map_err(|e| crate::Error::Config(format!("bad config file: {}", e)))
    }

    /// Write the configuration back out as TOML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::Error> {
        let rendered = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("config not representable as TOML: {}", e)))?;

        std::fs::write(&path, rendered)
            .map_err(|e| crate::Error::Config(format!("cannot write {}: {}", path.as_ref().display(), e)))
    }
}

/// Gateway section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway address (`host:port`)
    pub address: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{}", crate::DEFAULT_GATEWAY_PORT),
        }
    }
}

/// Timing section, durations in milliseconds; 0 means "use the default"
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub resend_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub response_timeout_ms: u64,
    pub connection_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            resend_interval_ms: DEFAULT_RESEND_INTERVAL.as_millis() as u64,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT.as_millis() as u64,
        }
    }
}

impl TimingConfig {
    /// Convert the file-facing fields into a [`ClientConfig`]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            resend_interval: Duration::from_millis(self.resend_interval_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
        }
        .sanitized()
    }
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
