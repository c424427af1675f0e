//! Message fan-out with per-connection failure isolation.
//!
//! Targets are collected under the pool lock and written to outside it,
//! concurrently. A failed write closes that one connection with
//! `SendFailure` and is not counted; the others are unaffected.

use futures_util::future::join_all;
use tracing::warn;

use super::ConnectionManager;
use crate::application::pool::Target;
use crate::domain::{CloseReason, ConnectionId, Direction, ServerMessage, SubjectId};

impl ConnectionManager {
    /// Deliver to one connection. Returns whether the write succeeded.
    pub async fn send_to_connection(&self, id: &ConnectionId, message: &ServerMessage) -> bool {
        match self.pool.target(id) {
            Some(target) => self.deliver(&target, message, true).await,
            None => false,
        }
    }

    /// Deliver to every connection of `subject`. Returns successful deliveries.
    pub async fn send_to_subject(&self, subject: &SubjectId, message: &ServerMessage) -> usize {
        let targets = self.pool.subject_targets(subject);
        self.deliver_all(&targets, message, true).await
    }

    /// Deliver to every connection subscribed to `channel`.
    pub async fn send_to_channel(&self, channel: &str, message: &ServerMessage) -> usize {
        let targets = self.pool.channel_targets(channel);
        self.deliver_all(&targets, message, true).await
    }

    /// Deliver to every connection, skipping those of `exclude_subject`.
    pub async fn broadcast(
        &self,
        message: &ServerMessage,
        exclude_subject: Option<&SubjectId>,
    ) -> usize {
        let targets = self.pool.all_targets(exclude_subject);
        self.deliver_all(&targets, message, true).await
    }

    pub(super) async fn deliver_all(
        &self,
        targets: &[Target],
        message: &ServerMessage,
        record_activity: bool,
    ) -> usize {
        join_all(
            targets
                .iter()
                .map(|target| self.deliver(target, message, record_activity)),
        )
        .await
        .into_iter()
        .filter(|delivered| *delivered)
        .count()
    }

    /// Write one message. Traffic is recorded against the connection only
    /// when `record_activity` is set, so heartbeats never keep a silent
    /// client alive.
    async fn deliver(
        &self,
        target: &Target,
        message: &ServerMessage,
        record_activity: bool,
    ) -> bool {
        match target.transport.send(message).await {
            Ok(bytes) => {
                if record_activity {
                    self.pool
                        .touch(&target.id, bytes as u64, 1, Direction::Sent);
                }
                true
            }
            Err(e) => {
                warn!(
                    connection_id = %target.id,
                    kind = message.kind(),
                    error = %e,
                    "Send failed, closing connection"
                );
                self.pool.close(&target.id, CloseReason::SendFailure).await;
                false
            }
        }
    }
}
