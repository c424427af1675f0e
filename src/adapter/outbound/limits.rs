//! OS limit discovery from `getrlimit` and `/proc/sys`.

use std::fs;
use std::path::{Path, PathBuf};

use sysinfo::System;
use tracing::debug;

use crate::port::{OsLimits, OsLimitsProbe};

const FILE_MAX: &str = "fs/file-max";
const SOMAXCONN: &str = "net/core/somaxconn";
const SYN_BACKLOG: &str = "net/ipv4/tcp_max_syn_backlog";
const PORT_RANGE: &str = "net/ipv4/ip_local_port_range";

/// Reads limits of the running host. Unreadable values are left `None`.
pub struct SystemLimitsProbe {
    sysctl_root: PathBuf,
}

impl SystemLimitsProbe {
    pub fn new() -> Self {
        Self::with_sysctl_root("/proc/sys")
    }

    /// Read sysctl values from `root` instead of `/proc/sys`.
    pub fn with_sysctl_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sysctl_root: root.into(),
        }
    }

    fn sysctl(&self, key: &str) -> Option<String> {
        let path = self.sysctl_root.join(key);
        read_trimmed(&path)
    }
}

impl Default for SystemLimitsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl OsLimitsProbe for SystemLimitsProbe {
    fn read(&self) -> OsLimits {
        let (open_files_soft, open_files_hard) = open_files_limit();

        let mut system = System::new();
        system.refresh_memory();
        let total_memory_bytes = Some(system.total_memory()).filter(|m| *m > 0);

        OsLimits {
            open_files_soft,
            open_files_hard,
            system_file_max: self.sysctl(FILE_MAX).as_deref().and_then(parse_u64),
            somaxconn: self.sysctl(SOMAXCONN).as_deref().and_then(parse_u64),
            tcp_max_syn_backlog: self.sysctl(SYN_BACKLOG).as_deref().and_then(parse_u64),
            ephemeral_ports: self.sysctl(PORT_RANGE).as_deref().and_then(parse_port_range),
            cpu_count: Some(num_cpus::get()),
            total_memory_bytes,
        }
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(s) => Some(s.trim().to_string()),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Limit not readable");
            None
        }
    }
}

fn parse_u64(s: &str) -> Option<u64> {
    s.trim().parse().ok()
}

/// Width of an inclusive `low high` port range.
fn parse_port_range(s: &str) -> Option<u64> {
    let mut parts = s.split_whitespace().map(str::parse::<u64>);
    let low = parts.next()?.ok()?;
    let high = parts.next()?.ok()?;
    (high >= low).then(|| high - low + 1)
}

#[cfg(unix)]
fn open_files_limit() -> (Option<u64>, Option<u64>) {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit for the duration of the call.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 {
        debug!(error = %std::io::Error::last_os_error(), "getrlimit failed");
        return (None, None);
    }
    (Some(limit.rlim_cur as u64), Some(limit.rlim_max as u64))
}

#[cfg(not(unix))]
fn open_files_limit() -> (Option<u64>, Option<u64>) {
    (None, None)
}
