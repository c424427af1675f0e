//! Connection pool: admission control and connection bookkeeping.
//!
//! The pool owns every registered [`Connection`] together with three
//! secondary indexes (by subject, by source address and by channel). All
//! index mutation happens under one mutex; lifetime counters that do not
//! need the indexes are atomics.
//!
//! # Admission
//!
//! [`ConnectionPool::can_accept`] rejects, in order, when the pool is shut
//! down, when the total is at `max_connections`, when the subject or source
//! bucket is full, or when the [`ResourceMonitor`] reports `Overloaded` and
//! the total is at or above the overload soft limit
//! (`max_connections * overload_admission_ratio`).
//! [`ConnectionPool::add`] repeats the same check under the lock, so a lost
//! race never overfills the pool.
//!
//! # Housekeeping
//!
//! [`ConnectionPool::start_background_tasks`] spawns one task that, every
//! `cleanup_interval_secs`, closes connections idle for longer than
//! `idle_timeout_secs` and trims expired resource samples.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::monitor::ResourceMonitor;
use crate::domain::{
    CloseReason, ConnectionId, ConnectionInfo, ConnectionLoad, Direction, ResourceStatus,
    SubjectId,
};
use crate::error::{AdmissionError, Result};
use crate::infrastructure::config::PoolConfig;
use crate::port::SharedTransport;

mod connection;
mod state;
mod stats;
mod sweep;

pub use connection::Connection;
pub use stats::PoolStats;

use state::{PoolState, PooledConnection, SharedCounters};

/// Upper bound on closing one transport during sweep or shutdown.
pub(crate) const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// A connection selected for delivery, detached from the pool lock.
#[derive(Clone)]
pub struct Target {
    pub id: ConnectionId,
    pub transport: SharedTransport,
}

/// Admission-controlled registry of live connections.
pub struct ConnectionPool {
    config: PoolConfig,
    monitor: Arc<ResourceMonitor>,
    state: Mutex<PoolState>,
    counters: Arc<SharedCounters>,
    background: CancellationToken,
    housekeeping: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    /// Create an empty pool.
    ///
    /// No background task runs until
    /// [`start_background_tasks`](Self::start_background_tasks) is called.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` fails validation.
    #[must_use = "returns Result that must be checked"]
    pub fn new(config: PoolConfig, monitor: Arc<ResourceMonitor>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            monitor,
            state: Mutex::new(PoolState::default()),
            counters: Arc::new(SharedCounters::new()),
            background: CancellationToken::new(),
            housekeeping: Mutex::new(None),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    /// Number of registered connections.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.counters.pending()
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shut_down
    }

    fn load(&self) -> ConnectionLoad {
        ConnectionLoad {
            active: self.active_count(),
            pending: self.pending_count(),
        }
    }

    /// Decide whether a new connection may be admitted.
    ///
    /// `subject` is the client's claimed identity, if it supplied one; the
    /// per-subject limit is skipped without it. The error names the limit
    /// that was hit.
    pub async fn can_accept(
        &self,
        subject: Option<&SubjectId>,
        source_address: &str,
    ) -> std::result::Result<(), AdmissionError> {
        let status = self.monitor.sample(self.load()).await;
        let state = self.state.lock();
        let verdict = self.check_admission(&state, subject, source_address, status);
        drop(state);

        if let Err(ref reason) = verdict {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(
                source = source_address,
                reason = %reason,
                "Admission check failed"
            );
        }
        verdict
    }

    fn check_admission(
        &self,
        state: &PoolState,
        subject: Option<&SubjectId>,
        source_address: &str,
        status: ResourceStatus,
    ) -> std::result::Result<(), AdmissionError> {
        if state.shut_down {
            return Err(AdmissionError::ShuttingDown);
        }

        let current = state.connections.len();
        if current >= self.config.max_connections {
            return Err(AdmissionError::Capacity {
                current,
                max: self.config.max_connections,
            });
        }

        if let Some(subject) = subject {
            let count = state.subject_count(subject);
            if count >= self.config.max_connections_per_subject {
                return Err(AdmissionError::SubjectLimit {
                    subject: subject.to_string(),
                    current: count,
                    max: self.config.max_connections_per_subject,
                });
            }
        }

        let count = state.source_count(source_address);
        if count >= self.config.max_connections_per_source {
            return Err(AdmissionError::SourceLimit {
                source_address: source_address.to_string(),
                current: count,
                max: self.config.max_connections_per_source,
            });
        }

        let soft_limit = self.config.overload_soft_limit();
        if status == ResourceStatus::Overloaded && current >= soft_limit {
            return Err(AdmissionError::ResourceOverloaded {
                current,
                soft_limit,
            });
        }

        Ok(())
    }

    /// Register an authenticated connection.
    ///
    /// Admission is re-checked under the lock against the connection's
    /// authenticated subject. On error nothing is mutated.
    pub async fn add(&self, connection: Connection) -> std::result::Result<(), AdmissionError> {
        let status = self.monitor.sample(self.load()).await;
        let mut state = self.state.lock();

        if state.connections.contains_key(connection.id()) {
            return Err(AdmissionError::DuplicateConnection(
                connection.id().to_string(),
            ));
        }
        if let Err(reason) = self.check_admission(
            &state,
            Some(connection.subject()),
            connection.source_address(),
            status,
        ) {
            drop(state);
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                connection_id = %connection.id(),
                subject = %connection.subject(),
                reason = %reason,
                "Registration refused"
            );
            return Err(reason);
        }

        let id = connection.id().clone();
        let subject = connection.subject().clone();
        state.insert(PooledConnection::new(connection, Instant::now()));
        let active = state.connections.len();
        drop(state);

        self.counters.created.fetch_add(1, Ordering::Relaxed);
        info!(
            connection_id = %id,
            subject = %subject,
            active,
            "Connection registered"
        );
        Ok(())
    }

    /// Unregister a connection without touching its transport.
    ///
    /// Returns false if the id is unknown. The connection's release token is
    /// cancelled.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        match self.take(id) {
            Some(entry) => {
                entry.connection.released().cancel();
                true
            }
            None => false,
        }
    }

    /// Unregister a connection and close its transport with `reason`.
    ///
    /// Returns false if the id is unknown.
    pub async fn close(&self, id: &ConnectionId, reason: CloseReason) -> bool {
        match self.take(id) {
            Some(entry) => {
                release(entry, reason).await;
                true
            }
            None => false,
        }
    }

    fn take(&self, id: &ConnectionId) -> Option<PooledConnection> {
        let entry = self.state.lock().take(id, Instant::now())?;
        self.counters.closed.fetch_add(1, Ordering::Relaxed);
        info!(
            connection_id = %id,
            subject = %entry.connection.subject(),
            "Connection removed"
        );
        Some(entry)
    }

    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionInfo> {
        let now = Instant::now();
        self.state.lock().connections.get(id).map(|e| e.info(now))
    }

    #[must_use]
    pub fn get_by_subject(&self, subject: &SubjectId) -> Vec<ConnectionInfo> {
        let now = Instant::now();
        let state = self.state.lock();
        let Some(ids) = state.by_subject.get(subject) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| state.connections.get(id))
            .map(|e| e.info(now))
            .collect()
    }

    /// Record traffic on a connection. Returns false if the id is unknown.
    pub fn touch(
        &self,
        id: &ConnectionId,
        bytes: u64,
        messages: u64,
        direction: Direction,
    ) -> bool {
        let now = Instant::now();
        match self.state.lock().connections.get_mut(id) {
            Some(entry) => {
                entry.touch(now, direction, bytes, messages);
                true
            }
            None => false,
        }
    }

    /// Add a connection to a channel. Returns false if the id is unknown.
    pub fn subscribe(&self, id: &ConnectionId, channel: &str) -> bool {
        self.state.lock().subscribe(id, channel)
    }

    /// Returns false if the id is unknown or was not subscribed.
    pub fn unsubscribe(&self, id: &ConnectionId, channel: &str) -> bool {
        self.state.lock().unsubscribe(id, channel)
    }

    #[must_use]
    pub fn target(&self, id: &ConnectionId) -> Option<Target> {
        self.state.lock().connections.get(id).map(to_target)
    }

    #[must_use]
    pub fn subject_targets(&self, subject: &SubjectId) -> Vec<Target> {
        let state = self.state.lock();
        state
            .by_subject
            .get(subject)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.connections.get(id))
                    .map(to_target)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn channel_targets(&self, channel: &str) -> Vec<Target> {
        let state = self.state.lock();
        state
            .by_channel
            .get(channel)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.connections.get(id))
                    .map(to_target)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every registered connection, optionally skipping one subject.
    #[must_use]
    pub fn all_targets(&self, exclude_subject: Option<&SubjectId>) -> Vec<Target> {
        self.state
            .lock()
            .connections
            .values()
            .filter(|e| exclude_subject != Some(e.connection.subject()))
            .map(to_target)
            .collect()
    }

    /// Count a connection that ended in the error state.
    pub fn record_failure(&self) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a connection as pending until the returned guard drops.
    #[must_use]
    pub fn begin_pending(&self) -> PendingGuard {
        self.counters.pending.fetch_add(1, Ordering::Relaxed);
        PendingGuard {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Evict expired resource samples.
    pub fn trim_metrics(&self) -> usize {
        self.monitor.trim()
    }

    /// Point-in-time statistics. Never probes resources.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let connections_by_subject: BTreeMap<String, usize> = state
            .by_subject
            .iter()
            .map(|(subject, ids)| (subject.to_string(), ids.len()))
            .collect();
        let connections_by_source: BTreeMap<String, usize> = state
            .by_source
            .iter()
            .map(|(source, ids)| (source.clone(), ids.len()))
            .collect();
        let active_connections = state.connections.len();
        let active_channels = state.by_channel.len();
        let peak_connections = state.peak;
        let average_session_secs = state.average_session_secs();
        let is_shutdown = state.shut_down;
        drop(state);

        PoolStats {
            captured_at: Utc::now(),
            config: self.config.clone(),
            active_connections,
            pending_connections: self.counters.pending(),
            unique_subjects: connections_by_subject.len(),
            unique_sources: connections_by_source.len(),
            active_channels,
            total_created: self.counters.created.load(Ordering::Relaxed),
            total_closed: self.counters.closed.load(Ordering::Relaxed),
            total_rejected: self.counters.rejected.load(Ordering::Relaxed),
            total_failed: self.counters.failed.load(Ordering::Relaxed),
            peak_connections,
            average_session_secs,
            resource_status: self.monitor.cached_status(),
            latest_sample: self.monitor.latest(),
            connections_by_subject,
            connections_by_source,
            is_shutdown,
        }
    }

    /// Close every connection with [`CloseReason::ServerShutdown`] and stop
    /// housekeeping.
    ///
    /// Only the first call does anything; it returns the number of
    /// connections closed.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<PooledConnection> = {
            let mut state = self.state.lock();
            if state.shut_down {
                return 0;
            }
            state.shut_down = true;
            let now = Instant::now();
            let ids: Vec<ConnectionId> = state.connections.keys().cloned().collect();
            ids.iter().filter_map(|id| state.take(id, now)).collect()
        };

        self.background.cancel();
        if let Some(handle) = self.housekeeping.lock().take() {
            handle.abort();
        }

        let closed = drained.len();
        self.counters
            .closed
            .fetch_add(closed as u64, Ordering::Relaxed);
        for entry in drained {
            release(entry, CloseReason::ServerShutdown).await;
        }

        info!(closed, "Connection pool shut down");
        closed
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.background.cancel();
    }
}

/// Decrements the pending count when dropped.
pub struct PendingGuard {
    counters: Arc<SharedCounters>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.counters.pending.fetch_sub(1, Ordering::Relaxed);
    }
}

fn to_target(entry: &PooledConnection) -> Target {
    Target {
        id: entry.connection.id().clone(),
        transport: Arc::clone(entry.connection.transport()),
    }
}

/// Signal the handling task and close the transport, bounded by
/// [`CLOSE_TIMEOUT`].
async fn release(entry: PooledConnection, reason: CloseReason) {
    let connection = entry.connection;
    connection.released().cancel();
    if tokio::time::timeout(CLOSE_TIMEOUT, connection.transport().close(reason))
        .await
        .is_err()
    {
        warn!(
            connection_id = %connection.id(),
            reason = %reason,
            "Transport close timed out"
        );
    }
}
