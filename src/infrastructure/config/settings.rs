//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all gateway settings.
//! Configuration is loaded from a TOML file; the signing secret may be
//! supplied through `WSGATE_JWT_SECRET` instead of the file.
//!
//! # Example
//!
//! ```no_run
//! use wsgate::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::auth::AuthConfig;
use super::logging::LoggingConfig;
use super::pool::{PoolConfig, RetryConfig};
use super::server::ServerConfig;
use crate::error::{ConfigError, Result};

/// Environment variable that overrides `auth.jwt_secret`.
pub const JWT_SECRET_ENV: &str = "WSGATE_JWT_SECRET";

/// Main gateway configuration.
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Listener, heartbeat and status file settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission limits, idle sweep and resource thresholds.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Authentication retry backoff.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Credential validation and fallback stages.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// A non-empty `WSGATE_JWT_SECRET` replaces the file's signing secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;

        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            if !secret.is_empty() {
                config.auth.jwt_secret = secret;
            }
        }

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML content is
    /// malformed, or validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.pool.validate()?;
        self.retry.validate()?;
        self.auth.validate()?;

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::InvalidValue {
                field: "logging.format",
                reason: "must be 'pretty' or 'json'".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Require a signing secret. Needed to serve, not to inspect.
    pub fn require_secret(&self) -> Result<&str> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::MissingField {
                field: "auth.jwt_secret",
            }
            .into());
        }
        Ok(&self.auth.jwt_secret)
    }

    /// Render the effective configuration as TOML, secret omitted.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::InvalidValue {
                field: "config",
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
