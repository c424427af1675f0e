//! Operating-system limits relevant to connection capacity.

use serde::Serialize;

/// OS-level ceilings that bound how many sockets the gateway can hold.
///
/// Every field is optional: a value the probe cannot read is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OsLimits {
    /// Soft `RLIMIT_NOFILE` of this process.
    pub open_files_soft: Option<u64>,
    /// Hard `RLIMIT_NOFILE` of this process.
    pub open_files_hard: Option<u64>,
    /// System-wide file handle ceiling (`fs.file-max`).
    pub system_file_max: Option<u64>,
    /// Accept queue ceiling (`net.core.somaxconn`).
    pub somaxconn: Option<u64>,
    /// SYN backlog (`net.ipv4.tcp_max_syn_backlog`).
    pub tcp_max_syn_backlog: Option<u64>,
    /// Ephemeral port range width (`net.ipv4.ip_local_port_range`).
    pub ephemeral_ports: Option<u64>,
    pub cpu_count: Option<usize>,
    pub total_memory_bytes: Option<u64>,
}

/// Reads [`OsLimits`] from the running system.
pub trait OsLimitsProbe: Send + Sync {
    fn read(&self) -> OsLimits;
}
