//! Idle sweep and the periodic housekeeping task.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::state::PooledConnection;
use super::{release, ConnectionPool};
use crate::domain::{CloseReason, ConnectionId};

impl ConnectionPool {
    /// Close every connection idle for longer than `idle_timeout_secs`.
    ///
    /// Expired connections are unregistered under the lock, then closed one
    /// by one outside it; each close is bounded, so a stuck transport does
    /// not hold up the rest. Returns the number of connections swept.
    pub async fn sweep_idle(&self) -> usize {
        let idle_timeout = self.config.idle_timeout();
        let now = Instant::now();

        let expired: Vec<PooledConnection> = {
            let mut state = self.state.lock();
            let ids: Vec<ConnectionId> = state
                .connections
                .iter()
                .filter(|(_, e)| now.duration_since(e.last_activity) > idle_timeout)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| state.take(id, now)).collect()
        };

        if expired.is_empty() {
            return 0;
        }

        let swept = expired.len();
        self.counters
            .closed
            .fetch_add(swept as u64, std::sync::atomic::Ordering::Relaxed);

        for entry in expired {
            info!(
                connection_id = %entry.connection.id(),
                subject = %entry.connection.subject(),
                idle_secs = now.duration_since(entry.last_activity).as_secs(),
                "Closing idle connection"
            );
            release(entry, CloseReason::IdleTimeout).await;
        }
        swept
    }

    /// Spawn the housekeeping task. Calling it again is a no-op.
    ///
    /// The task holds only a weak reference and stops when the pool is shut
    /// down or dropped.
    pub fn start_background_tasks(self: &Arc<Self>) {
        let mut slot = self.housekeeping.lock();
        if slot.is_some() || self.background.is_cancelled() {
            return;
        }
        *slot = Some(tokio::spawn(housekeeping_task(
            Arc::downgrade(self),
            self.config.cleanup_interval(),
            self.background.clone(),
        )));
    }
}

async fn housekeeping_task(
    pool: Weak<ConnectionPool>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(interval_secs = every.as_secs(), "Housekeeping task started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(pool) = pool.upgrade() else {
            break;
        };
        let swept = pool.sweep_idle().await;
        let trimmed = pool.trim_metrics();
        debug!(swept, trimmed, "Housekeeping pass complete");
    }

    debug!("Housekeeping task stopped");
}
