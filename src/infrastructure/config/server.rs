//! WebSocket server configuration.

use std::time::Duration;

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Listener, heartbeat, and status reporting settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the WebSocket listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Interval between server heartbeat messages (seconds).
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Upper bound on the whole authentication phase, backoff included (seconds).
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
    /// Per-connection outbound queue length.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Use the first `X-Forwarded-For` entry as the source address.
    #[serde(default)]
    pub trust_forwarded_for: bool,
    /// Where to write the statistics status file; disabled when unset.
    #[serde(default)]
    pub status_file: Option<String>,
    /// Interval between status file writes (seconds).
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0:8765".to_string()
}

const fn default_heartbeat_interval_secs() -> u64 {
    30
}

const fn default_auth_timeout_secs() -> u64 {
    30
}

const fn default_outbound_buffer() -> usize {
    256
}

const fn default_status_interval_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            auth_timeout_secs: default_auth_timeout_secs(),
            outbound_buffer: default_outbound_buffer(),
            trust_forwarded_for: false,
            status_file: None,
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    #[must_use]
    pub const fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    #[must_use]
    pub const fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "bind_address",
                reason: format!("'{}' is not a socket address", self.bind_address),
            });
        }
        for (field, value) in [
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("auth_timeout_secs", self.auth_timeout_secs),
            ("outbound_buffer", self.outbound_buffer as u64),
            ("status_interval_secs", self.status_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than 0".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bind_address_parses() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn hostname_bind_address_is_rejected() {
        let config = ServerConfig {
            bind_address: "localhost:80".to_string(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
