//! Point-in-time pool statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ResourceSample, ResourceStatus};
use crate::infrastructure::config::PoolConfig;

/// Snapshot of pool configuration, counts and lifetime counters.
///
/// Copied out under the pool lock; serializing it never touches live
/// connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub captured_at: DateTime<Utc>,
    pub config: PoolConfig,
    pub active_connections: usize,
    /// Connections past the handshake but not yet registered.
    pub pending_connections: usize,
    pub unique_subjects: usize,
    pub unique_sources: usize,
    pub active_channels: usize,
    pub total_created: u64,
    pub total_closed: u64,
    /// Admission rejections, at the handshake or on registration.
    pub total_rejected: u64,
    /// Connections that ended in the error state.
    pub total_failed: u64,
    pub peak_connections: usize,
    pub average_session_secs: f64,
    pub resource_status: Option<ResourceStatus>,
    pub latest_sample: Option<ResourceSample>,
    pub connections_by_subject: BTreeMap<String, usize>,
    pub connections_by_source: BTreeMap<String, usize>,
    pub is_shutdown: bool,
}
