//! Connection configuration.
//!
//! Every field has a serde default, so a partial JSON document is enough:
//!
//! ```
//! use rntbd_client::ConnectionConfig;
//!
//! let config = ConnectionConfig::from_json(r#"{ "request_timeout_ms": 2500 }"#).unwrap();
//! assert_eq!(config.request_timeout().as_millis(), 2500);
//! assert_eq!(config.connect_timeout_ms, 5000);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RntbdError};
use crate::protocol::{DEFAULT_MAX_FRAME_LENGTH, HEADER_SIZE};
use crate::timer::DEFAULT_TIMER_POOL_CAPACITY;

/// Protocol version announced during context negotiation.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 0x0000_0001;

/// Settings for one connection and the transport that creates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Budget for resolve plus TCP connect, and again for the TLS handshake.
    pub connect_timeout_ms: u64,

    /// Budget applied separately to each frame write and each frame read.
    pub request_timeout_ms: u64,

    /// Client-side idle limit; a server hint can only shorten it.
    pub idle_timeout_ms: u64,

    /// Grace period before the first successful request; replaced by the
    /// server hint after negotiation.
    pub unauthenticated_timeout_ms: u64,

    /// Largest `total_length` (and body length) accepted from the server.
    pub max_frame_length: u32,

    pub keepalive: bool,
    pub keepalive_interval_secs: u64,

    pub user_agent: String,
    pub client_version: String,
    pub protocol_version: u32,

    /// Idle timers kept by the transport's shared timer pool.
    pub timer_pool_capacity: usize,

    pub tls: TlsConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            idle_timeout_ms: 30 * 60 * 1000,
            unauthenticated_timeout_ms: 5 * 60 * 1000,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            keepalive: true,
            keepalive_interval_secs: 30,
            user_agent: format!("rntbd-client/{}", env!("CARGO_PKG_VERSION")),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            timer_pool_capacity: DEFAULT_TIMER_POOL_CAPACITY,
            tls: TlsConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("idle_timeout_ms", self.idle_timeout_ms),
            ("unauthenticated_timeout_ms", self.unauthenticated_timeout_ms),
        ] {
            if value == 0 {
                return Err(RntbdError::Config(format!("{} must be positive", name)));
            }
        }
        if (self.max_frame_length as usize) < HEADER_SIZE {
            return Err(RntbdError::Config(format!(
                "max_frame_length {} cannot hold a {}-byte header",
                self.max_frame_length, HEADER_SIZE
            )));
        }
        if self.user_agent.len() > 255 || self.client_version.len() > 255 {
            return Err(RntbdError::Config(
                "user_agent and client_version are limited to 255 bytes".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_unauthenticated_timeout(mut self, timeout: Duration) -> Self {
        self.unauthenticated_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_frame_length(mut self, length: u32) -> Self {
        self.max_frame_length = length;
        self
    }

    pub fn with_keepalive(mut self, enabled: bool) -> Self {
        self.keepalive = enabled;
        self
    }

    pub fn with_keepalive_interval_secs(mut self, secs: u64) -> Self {
        self.keepalive_interval_secs = secs;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_timer_pool_capacity(mut self, capacity: usize) -> Self {
        self.timer_pool_capacity = capacity;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn unauthenticated_timeout(&self) -> Duration {
        Duration::from_millis(self.unauthenticated_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

/// TLS settings for the client handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM bundle of trusted roots; the bundled web PKI roots when absent.
    pub ca_cert_path: Option<PathBuf>,

    /// Name used for SNI and certificate validation instead of the dialed host.
    pub host_name_override: Option<String>,

    /// Skip certificate verification. Emulator and test targets only.
    pub accept_invalid_certificates: bool,
}

impl TlsConfig {
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_host_name_override(mut self, host: impl Into<String>) -> Self {
        self.host_name_override = Some(host.into());
        self
    }

    pub fn with_accept_invalid_certificates(mut self, accept: bool) -> Self {
        self.accept_invalid_certificates = accept;
        self
    }
}
