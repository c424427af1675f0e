//! System resource probe port.

use crate::domain::ResourceReading;
use crate::error::ProbeError;

/// Reports current memory and CPU utilization.
///
/// Reads may be expensive; the resource monitor caches and de-duplicates
/// them. A failed read is treated as a `Warning` status.
pub trait ResourceProbe: Send + Sync {
    fn read(&self) -> Result<ResourceReading, ProbeError>;
}
