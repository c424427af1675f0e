//! Memory and CPU utilization via `sysinfo`.

use parking_lot::Mutex;
use sysinfo::System;

use crate::domain::ResourceReading;
use crate::error::ProbeError;
use crate::port::ResourceProbe;

/// Reads host-wide memory and CPU utilization.
///
/// CPU usage is the delta since the previous refresh, so the first read
/// after construction may report zero.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn read(&self) -> Result<ResourceReading, ProbeError> {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_cpu_usage();

        let total = system.total_memory();
        if total == 0 {
            return Err(ProbeError::Unavailable(
                "total memory reported as zero".to_string(),
            ));
        }
        let memory_percent = system.used_memory() as f64 / total as f64 * 100.0;
        let cpu_percent = f64::from(system.global_cpu_usage());

        Ok(ResourceReading {
            memory_percent,
            cpu_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_percentages_in_range() {
        let probe = SysinfoProbe::new();
        let reading = probe.read().unwrap();
        assert!((0.0..=100.0).contains(&reading.memory_percent));
        assert!(reading.cpu_percent >= 0.0);
    }
}
