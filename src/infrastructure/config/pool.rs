//! Connection pool and authentication retry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ResourceThresholds;
use crate::error::ConfigError;

/// Connection pool admission and housekeeping policy.
///
/// Immutable once the pool is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of live connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum live connections per subject.
    #[serde(default = "default_max_connections_per_subject")]
    pub max_connections_per_subject: usize,
    /// Maximum live connections per source address.
    #[serde(default = "default_max_connections_per_source")]
    pub max_connections_per_source: usize,
    /// Seconds without activity before the idle sweep closes a connection.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Interval of the idle sweep and metrics trim (seconds).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// How long resource samples are retained (seconds).
    #[serde(default = "default_metrics_retention_secs")]
    pub metrics_retention_secs: u64,
    /// Memory utilization (percent) at which the system counts as overloaded.
    #[serde(default = "default_max_memory_percent")]
    pub max_memory_percent: f64,
    /// CPU utilization (percent) at which the system counts as overloaded.
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: f64,
    /// Fraction of `max_connections` above which an overloaded system
    /// refuses new connections (0.0-1.0).
    #[serde(default = "default_overload_admission_ratio")]
    pub overload_admission_ratio: f64,
    /// How long a resource reading is reused before probing again (milliseconds).
    #[serde(default = "default_resource_cache_ttl_ms")]
    pub resource_cache_ttl_ms: u64,
}

const fn default_max_connections() -> usize {
    1000
}

const fn default_max_connections_per_subject() -> usize {
    10
}

const fn default_max_connections_per_source() -> usize {
    50
}

const fn default_idle_timeout_secs() -> u64 {
    300
}

const fn default_cleanup_interval_secs() -> u64 {
    60
}

const fn default_metrics_retention_secs() -> u64 {
    3600
}

fn default_max_memory_percent() -> f64 {
    85.0
}

fn default_max_cpu_percent() -> f64 {
    80.0
}

fn default_overload_admission_ratio() -> f64 {
    0.8
}

const fn default_resource_cache_ttl_ms() -> u64 {
    5000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_connections_per_subject: default_max_connections_per_subject(),
            max_connections_per_source: default_max_connections_per_source(),
            idle_timeout_secs: default_idle_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            metrics_retention_secs: default_metrics_retention_secs(),
            max_memory_percent: default_max_memory_percent(),
            max_cpu_percent: default_max_cpu_percent(),
            overload_admission_ratio: default_overload_admission_ratio(),
            resource_cache_ttl_ms: default_resource_cache_ttl_ms(),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    #[must_use]
    pub const fn metrics_retention(&self) -> Duration {
        Duration::from_secs(self.metrics_retention_secs)
    }

    #[must_use]
    pub const fn resource_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.resource_cache_ttl_ms)
    }

    #[must_use]
    pub const fn thresholds(&self) -> ResourceThresholds {
        ResourceThresholds {
            max_memory_percent: self.max_memory_percent,
            max_cpu_percent: self.max_cpu_percent,
        }
    }

    /// Connection count above which an overloaded system refuses admission.
    #[must_use]
    pub fn overload_soft_limit(&self) -> usize {
        (self.max_connections as f64 * self.overload_admission_ratio).floor() as usize
    }

    /// Check limits and intervals are usable.
    ///
    /// Per-subject or per-source limits above `max_connections` are legal
    /// here and reported by the tuner instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_connections", self.max_connections as u64),
            (
                "max_connections_per_subject",
                self.max_connections_per_subject as u64,
            ),
            (
                "max_connections_per_source",
                self.max_connections_per_source as u64,
            ),
            ("idle_timeout_secs", self.idle_timeout_secs),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
            ("metrics_retention_secs", self.metrics_retention_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than 0".to_string(),
                });
            }
        }
        for (field, value) in [
            ("max_memory_percent", self.max_memory_percent),
            ("max_cpu_percent", self.max_cpu_percent),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be in (0, 100]".to_string(),
                });
            }
        }
        if !(self.overload_admission_ratio > 0.0 && self.overload_admission_ratio <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "overload_admission_ratio",
                reason: "must be in (0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

/// Authentication retry policy with capped exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts before the retry stage gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on any single delay (milliseconds).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor applied per attempt.
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
    /// Maximum request ids tracked at once.
    #[serde(default = "default_tracker_capacity")]
    pub tracker_capacity: usize,
    /// Seconds after which an untouched retry entry is evicted.
    #[serde(default = "default_tracker_ttl_secs")]
    pub tracker_ttl_secs: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    1000
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_exponential_base() -> f64 {
    2.0
}

const fn default_tracker_capacity() -> usize {
    10_000
}

const fn default_tracker_ttl_secs() -> u64 {
    600
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
            tracker_capacity: default_tracker_capacity(),
            tracker_ttl_secs: default_tracker_ttl_secs(),
        }
    }
}

impl RetryConfig {
    /// Backoff delay for a given attempt: `base * exponential_base^attempt`,
    /// capped at `max_delay_ms`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.base_delay_ms as f64 * self.exponential_base.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    #[must_use]
    pub const fn tracker_ttl(&self) -> Duration {
        Duration::from_secs(self.tracker_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "base_delay_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "max_delay_ms",
                reason: "must be >= base_delay_ms".to_string(),
            });
        }
        if self.exponential_base < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "exponential_base",
                reason: "must be >= 1.0".to_string(),
            });
        }
        if self.tracker_capacity == 0 || self.tracker_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry_tracker",
                reason: "capacity and ttl must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
