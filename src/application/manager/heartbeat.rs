//! Periodic server-to-client heartbeat.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ConnectionManager;
use crate::domain::ServerMessage;

impl ConnectionManager {
    /// Send one heartbeat to every registered connection.
    ///
    /// Heartbeats do not count as activity. Returns successful deliveries.
    pub async fn send_heartbeat(&self) -> usize {
        let targets = self.pool.all_targets(None);
        self.deliver_all(&targets, &ServerMessage::heartbeat(), false)
            .await
    }

    pub(super) fn spawn_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(heartbeat_task(
            Arc::downgrade(self),
            self.config.heartbeat_interval(),
            self.shutdown.clone(),
        ))
    }
}

async fn heartbeat_task(
    manager: Weak<ConnectionManager>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let Some(manager) = manager.upgrade() else {
            break;
        };
        let delivered = manager.send_heartbeat().await;
        debug!(delivered, "Heartbeat sent");
    }

    debug!("Heartbeat task stopped");
}
