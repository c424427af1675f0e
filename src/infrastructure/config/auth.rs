//! Authentication configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const SUPPORTED_ALGORITHMS: [&str; 3] = ["HS256", "HS384", "HS512"];

/// Credential validation and fallback policy.
///
/// The signing secret is never serialized; `WSGATE_JWT_SECRET` overrides
/// the file value at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to verify and sign credentials.
    #[serde(default, skip_serializing)]
    pub jwt_secret: String,
    /// Signing algorithm: HS256, HS384 or HS512.
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Claims every credential must carry.
    #[serde(default = "default_required_claims")]
    pub required_claims: Vec<String>,
    /// Clock skew tolerated on expiry checks (seconds).
    #[serde(default)]
    pub leeway_secs: u64,
    /// Required `aud` claim. Unset accepts any audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    /// Lifetime of credentials issued by the refresh stage (seconds).
    #[serde(default = "default_refresh_lifetime_secs")]
    pub refresh_lifetime_secs: u64,
    /// Enable the guest-mode fallback.
    #[serde(default)]
    pub guest_mode: bool,
    /// Lifetime of guest credentials (seconds).
    #[serde(default = "default_guest_lifetime_secs")]
    pub guest_lifetime_secs: u64,
    /// Permissions granted to guest credentials.
    #[serde(default = "default_guest_permissions")]
    pub guest_permissions: Vec<String>,
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_required_claims() -> Vec<String> {
    vec!["sub".to_string(), "exp".to_string()]
}

const fn default_refresh_lifetime_secs() -> u64 {
    24 * 60 * 60
}

const fn default_guest_lifetime_secs() -> u64 {
    60 * 60
}

fn default_guest_permissions() -> Vec<String> {
    vec!["read_only".to_string()]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            algorithm: default_algorithm(),
            required_claims: default_required_claims(),
            leeway_secs: 0,
            audience: None,
            refresh_lifetime_secs: default_refresh_lifetime_secs(),
            guest_mode: false,
            guest_lifetime_secs: default_guest_lifetime_secs(),
            guest_permissions: default_guest_permissions(),
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub const fn refresh_lifetime(&self) -> Duration {
        Duration::from_secs(self.refresh_lifetime_secs)
    }

    #[must_use]
    pub const fn guest_lifetime(&self) -> Duration {
        Duration::from_secs(self.guest_lifetime_secs)
    }

    /// Check algorithm and lifetimes. An empty secret is allowed here so
    /// that offline commands work; the server refuses to start without one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_ALGORITHMS.contains(&self.algorithm.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "algorithm",
                reason: format!("must be one of {}", SUPPORTED_ALGORITHMS.join(", ")),
            });
        }
        if self.audience.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::InvalidValue {
                field: "audience",
                reason: "must not be empty when set".to_string(),
            });
        }
        if self.refresh_lifetime_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "refresh_lifetime_secs",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.guest_lifetime_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "guest_lifetime_secs",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
