//! Advisory diagnosis of OS limits against the configured capacity.
//!
//! The report is consumed by operators and deployment tooling; nothing in
//! the pool reads it at runtime.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::infrastructure::config::{PoolConfig, ServerConfig};
use crate::port::{OsLimits, OsLimitsProbe};

/// File descriptors kept free for listeners, logs and the status file.
pub const FD_RESERVE: u64 = 256;

/// Rough resident cost of one idle WebSocket connection.
pub const CONNECTION_BASE_BYTES: u64 = 64 * 1024;

/// Budgeted size of one queued outbound message.
pub const OUTBOUND_MESSAGE_BYTES: u64 = 512;

/// Lower bound for the accept and SYN backlog recommendations.
const MIN_BACKLOG: u64 = 1024;
const MAX_BACKLOG: u64 = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Advisory,
    Warning,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Advisory => "advisory",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a finding concerns the host or the gateway's own configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Os,
    Config,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub check: &'static str,
    pub area: Area,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Finding {
    fn new(
        check: &'static str,
        area: Area,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            check,
            area,
            severity,
            message: message.into(),
            recommendation: None,
        }
    }

    fn recommend(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    fn unknown(check: &'static str, what: &str) -> Self {
        Self::new(check, Area::Os, Severity::Advisory, format!("{what} is unknown"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TuningReport {
    pub target_connections: usize,
    pub limits: OsLimits,
    pub findings: Vec<Finding>,
}

impl TuningReport {
    /// Highest severity among the findings.
    #[must_use]
    pub fn worst(&self) -> Severity {
        self.findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Ok)
    }

    /// No warning or critical findings.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.worst() <= Severity::Advisory
    }

    #[must_use]
    pub fn finding(&self, check: &str) -> Option<&Finding> {
        self.findings.iter().find(|f| f.check == check)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

/// Reads OS limits and grades them against the configuration.
pub struct SystemTuner {
    probe: Arc<dyn OsLimitsProbe>,
}

impl SystemTuner {
    pub fn new(probe: Arc<dyn OsLimitsProbe>) -> Self {
        Self { probe }
    }

    /// Read live limits and diagnose them.
    #[must_use]
    pub fn run(&self, pool: &PoolConfig, server: &ServerConfig) -> TuningReport {
        Self::diagnose(&self.probe.read(), pool, server)
    }

    #[must_use]
    pub fn diagnose(limits: &OsLimits, pool: &PoolConfig, server: &ServerConfig) -> TuningReport {
        let target = pool.max_connections as u64;
        let required_fds = target + FD_RESERVE;
        let backlog = backlog_target(target);

        let findings = vec![
            open_files(limits, required_fds),
            file_max(limits, required_fds),
            somaxconn(limits, backlog),
            syn_backlog(limits, backlog),
            ephemeral_ports(limits, target),
            memory_budget(limits, pool, server),
            per_bucket_limits(pool),
            idle_vs_heartbeat(pool, server),
        ];

        TuningReport {
            target_connections: pool.max_connections,
            limits: limits.clone(),
            findings,
        }
    }
}

/// Accept queue size able to absorb a reconnect storm of a quarter of the pool.
fn backlog_target(max_connections: u64) -> u64 {
    (max_connections / 4).clamp(MIN_BACKLOG, MAX_BACKLOG)
}

fn open_files(limits: &OsLimits, required: u64) -> Finding {
    const CHECK: &str = "open_files";
    let Some(soft) = limits.open_files_soft else {
        return Finding::unknown(CHECK, "open file limit");
    };
    let fix = format!("ulimit -n {required} (systemd: LimitNOFILE={required})");

    match limits.open_files_hard {
        Some(hard) if hard < required => Finding::new(
            CHECK,
            Area::Os,
            Severity::Critical,
            format!("hard limit {hard} is below the {required} descriptors needed"),
        )
        .recommend(format!("raise the hard limit: {fix}")),
        _ if soft < required => Finding::new(
            CHECK,
            Area::Os,
            Severity::Warning,
            format!("soft limit {soft} is below the {required} descriptors needed"),
        )
        .recommend(fix),
        _ => Finding::new(
            CHECK,
            Area::Os,
            Severity::Ok,
            format!("soft limit {soft} covers {required} descriptors"),
        ),
    }
}

fn file_max(limits: &OsLimits, required: u64) -> Finding {
    const CHECK: &str = "file_max";
    match limits.system_file_max {
        None => Finding::unknown(CHECK, "fs.file-max"),
        Some(max) if max < required => Finding::new(
            CHECK,
            Area::Os,
            Severity::Critical,
            format!("fs.file-max {max} is below the {required} descriptors needed"),
        )
        .recommend(format!("sysctl -w fs.file-max={}", required * 4)),
        Some(max) => Finding::new(CHECK, Area::Os, Severity::Ok, format!("fs.file-max {max}")),
    }
}

fn somaxconn(limits: &OsLimits, target: u64) -> Finding {
    const CHECK: &str = "somaxconn";
    match limits.somaxconn {
        None => Finding::unknown(CHECK, "net.core.somaxconn"),
        Some(value) if value < target => Finding::new(
            CHECK,
            Area::Os,
            Severity::Warning,
            format!("net.core.somaxconn {value} is below the burst estimate {target}"),
        )
        .recommend(format!("sysctl -w net.core.somaxconn={target}")),
        Some(value) => Finding::new(
            CHECK,
            Area::Os,
            Severity::Ok,
            format!("net.core.somaxconn {value}"),
        ),
    }
}

fn syn_backlog(limits: &OsLimits, target: u64) -> Finding {
    const CHECK: &str = "tcp_max_syn_backlog";
    match limits.tcp_max_syn_backlog {
        None => Finding::unknown(CHECK, "net.ipv4.tcp_max_syn_backlog"),
        Some(value) if value < target => Finding::new(
            CHECK,
            Area::Os,
            Severity::Advisory,
            format!("net.ipv4.tcp_max_syn_backlog {value} is below the burst estimate {target}"),
        )
        .recommend(format!("sysctl -w net.ipv4.tcp_max_syn_backlog={target}")),
        Some(value) => Finding::new(
            CHECK,
            Area::Os,
            Severity::Ok,
            format!("net.ipv4.tcp_max_syn_backlog {value}"),
        ),
    }
}

// Only matters when a local proxy opens one upstream socket per client.
fn ephemeral_ports(limits: &OsLimits, target: u64) -> Finding {
    const CHECK: &str = "ephemeral_ports";
    match limits.ephemeral_ports {
        None => Finding::unknown(CHECK, "ephemeral port range"),
        Some(ports) if ports < target => Finding::new(
            CHECK,
            Area::Os,
            Severity::Advisory,
            format!("{ports} ephemeral ports; a same-host proxy cannot front {target} clients"),
        )
        .recommend("sysctl -w net.ipv4.ip_local_port_range=\"1024 65535\""),
        Some(ports) => Finding::new(
            CHECK,
            Area::Os,
            Severity::Ok,
            format!("{ports} ephemeral ports"),
        ),
    }
}

fn memory_budget(limits: &OsLimits, pool: &PoolConfig, server: &ServerConfig) -> Finding {
    const CHECK: &str = "memory_budget";
    let Some(total) = limits.total_memory_bytes else {
        return Finding::unknown(CHECK, "total memory");
    };
    let per_connection =
        CONNECTION_BASE_BYTES + server.outbound_buffer as u64 * OUTBOUND_MESSAGE_BYTES;
    let needed = per_connection.saturating_mul(pool.max_connections as u64);
    let budget = (total as f64 * pool.max_memory_percent / 100.0) as u64;

    let message = format!(
        "{} connections x {} KiB = {} MiB against a {} MiB budget ({}% of {} MiB)",
        pool.max_connections,
        per_connection / 1024,
        needed / (1024 * 1024),
        budget / (1024 * 1024),
        pool.max_memory_percent,
        total / (1024 * 1024),
    );
    if needed > budget {
        let fitting = budget / per_connection.max(1);
        Finding::new(CHECK, Area::Config, Severity::Critical, message)
            .recommend(format!("lower pool.max_connections to at most {fitting}"))
    } else if needed > budget / 2 {
        Finding::new(CHECK, Area::Config, Severity::Advisory, message)
    } else {
        Finding::new(CHECK, Area::Config, Severity::Ok, message)
    }
}

fn per_bucket_limits(pool: &PoolConfig) -> Finding {
    const CHECK: &str = "bucket_limits";
    let mut problems = Vec::new();
    if pool.max_connections_per_subject > pool.max_connections {
        problems.push(format!(
            "max_connections_per_subject {} exceeds max_connections {}",
            pool.max_connections_per_subject, pool.max_connections
        ));
    }
    if pool.max_connections_per_source > pool.max_connections {
        problems.push(format!(
            "max_connections_per_source {} exceeds max_connections {}",
            pool.max_connections_per_source, pool.max_connections
        ));
    }
    if problems.is_empty() {
        return Finding::new(
            CHECK,
            Area::Config,
            Severity::Ok,
            "per-subject and per-source limits fit the total",
        );
    }
    Finding::new(CHECK, Area::Config, Severity::Warning, problems.join("; "))
        .recommend("per-bucket limits above the total never apply")
}

fn idle_vs_heartbeat(pool: &PoolConfig, server: &ServerConfig) -> Finding {
    const CHECK: &str = "idle_timeout";
    let minimum = server.heartbeat_interval_secs.saturating_mul(2);
    if pool.idle_timeout_secs < minimum {
        return Finding::new(
            CHECK,
            Area::Config,
            Severity::Warning,
            format!(
                "idle timeout {}s is shorter than two heartbeat intervals ({minimum}s)",
                pool.idle_timeout_secs
            ),
        )
        .recommend(format!("set pool.idle_timeout_secs to at least {minimum}"));
    }
    Finding::new(
        CHECK,
        Area::Config,
        Severity::Ok,
        format!("idle timeout {}s", pool.idle_timeout_secs),
    )
}
