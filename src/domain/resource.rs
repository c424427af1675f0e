//! System resource readings and load classification.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse system load classification used by admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Healthy,
    Warning,
    Critical,
    Overloaded,
}

impl ResourceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Overloaded => "overloaded",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw utilization reported by a resource probe, in percent (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceReading {
    pub memory_percent: f64,
    pub cpu_percent: f64,
}

/// Upper bounds for memory and CPU utilization, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceThresholds {
    pub max_memory_percent: f64,
    pub max_cpu_percent: f64,
}

/// Fraction of a maximum at which load is `Critical`.
const CRITICAL_RATIO: f64 = 0.9;

/// Fraction of a maximum at which load is `Warning`.
const WARNING_RATIO: f64 = 0.8;

impl ResourceThresholds {
    /// Classify a reading against these thresholds.
    ///
    /// The worse of memory and CPU decides the status.
    #[must_use]
    pub fn classify(&self, reading: ResourceReading) -> ResourceStatus {
        let memory = Self::grade(reading.memory_percent, self.max_memory_percent);
        let cpu = Self::grade(reading.cpu_percent, self.max_cpu_percent);
        memory.max(cpu)
    }

    fn grade(value: f64, max: f64) -> ResourceStatus {
        if value >= max {
            ResourceStatus::Overloaded
        } else if value >= max * CRITICAL_RATIO {
            ResourceStatus::Critical
        } else if value >= max * WARNING_RATIO {
            ResourceStatus::Warning
        } else {
            ResourceStatus::Healthy
        }
    }
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            max_memory_percent: 85.0,
            max_cpu_percent: 80.0,
        }
    }
}

/// Point-in-time system reading retained in the monitor's ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub memory_percent: f64,
    pub cpu_percent: f64,
    pub active_connections: usize,
    pub pending_connections: usize,
    pub status: ResourceStatus,
}

/// Connection counts recorded alongside a resource sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionLoad {
    pub active: usize,
    pub pending: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(memory_percent: f64, cpu_percent: f64) -> ResourceReading {
        ResourceReading {
            memory_percent,
            cpu_percent,
        }
    }

    fn thresholds() -> ResourceThresholds {
        ResourceThresholds {
            max_memory_percent: 80.0,
            max_cpu_percent: 50.0,
        }
    }

    #[test]
    fn classify_healthy_below_warning_band() {
        assert_eq!(thresholds().classify(reading(10.0, 10.0)), ResourceStatus::Healthy);
    }

    #[test]
    fn classify_bands_use_fraction_of_max() {
        let t = thresholds();
        // 80% of 80 = 64
        assert_eq!(t.classify(reading(64.0, 0.0)), ResourceStatus::Warning);
        // 90% of 80 = 72
        assert_eq!(t.classify(reading(72.0, 0.0)), ResourceStatus::Critical);
        assert_eq!(t.classify(reading(80.0, 0.0)), ResourceStatus::Overloaded);
    }

    #[test]
    fn classify_takes_worse_dimension() {
        // memory healthy, cpu at max
        assert_eq!(thresholds().classify(reading(5.0, 50.0)), ResourceStatus::Overloaded);
    }

    #[test]
    fn status_ordering_reflects_severity() {
        assert!(ResourceStatus::Healthy < ResourceStatus::Warning);
        assert!(ResourceStatus::Critical < ResourceStatus::Overloaded);
    }
}
