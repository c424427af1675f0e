//! Connection manager: the per-connection orchestration around the pool.
//!
//! Every inbound upgrade goes through [`ConnectionManager::handle`]:
//!
//! 1. admission check against the [`ConnectionPool`]; a refusal rejects the
//!    handshake with the rejection's close code and creates no state
//! 2. handshake acceptance (the connection is now `Pending`)
//! 3. authentication through the [`AuthFallbackChain`], sleeping through
//!    `retry_needed` outcomes, bounded by `server.auth_timeout_secs`
//! 4. registration in the pool
//! 5. `connection_established` confirmation
//! 6. the read loop, until the client closes, the pool releases the
//!    connection (idle sweep, send failure, shutdown) or the stream ends
//!
//! Fan-out lives in `fanout`, the heartbeat task in `heartbeat`.

mod fanout;
mod heartbeat;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::auth::AuthFallbackChain;
use crate::application::pool::{Connection, ConnectionPool, PoolStats};
use crate::domain::{
    AuthOutcome, AuthStage, AuthStatus, ClientMessage, CloseReason, ConnectionId,
    ConnectionRequest, ConnectionState, Direction, Lifecycle, RequestId, ServerMessage, SubjectId,
};
use crate::error::{ConnectError, TransportError};
use crate::infrastructure::config::ServerConfig;
use crate::port::{Accepted, Handshake, InboundFrame, InboundStream};

/// A connection that passed authentication and registration.
///
/// Returned by [`ConnectionManager::establish`] and consumed by
/// [`ConnectionManager::serve`].
pub struct Established {
    id: ConnectionId,
    subject: SubjectId,
    request_id: RequestId,
    outcome: AuthOutcome,
    released: CancellationToken,
    inbound: Box<dyn InboundStream>,
    lifecycle: Lifecycle,
}

impl Established {
    #[must_use]
    pub const fn id(&self) -> &ConnectionId {
        &self.id
    }

    #[must_use]
    pub const fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// Outcome of the authentication that admitted this connection.
    #[must_use]
    pub const fn outcome(&self) -> &AuthOutcome {
        &self.outcome
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }
}

impl std::fmt::Debug for Established {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Established")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

/// Owns the pool and the fallback chain and drives each connection through
/// its lifecycle.
pub struct ConnectionManager {
    pool: Arc<ConnectionPool>,
    auth: Arc<AuthFallbackChain>,
    config: ServerConfig,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        pool: Arc<ConnectionPool>,
        auth: Arc<AuthFallbackChain>,
        config: ServerConfig,
    ) -> Self {
        Self {
            pool,
            auth,
            config,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<AuthFallbackChain> {
        &self.auth
    }

    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when the manager shuts down.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start pool housekeeping and the heartbeat task.
    pub fn start(self: &Arc<Self>) {
        if self.is_shutting_down() {
            return;
        }
        self.pool.start_background_tasks();
        let heartbeat = self.spawn_heartbeat();
        self.tasks.lock().push(heartbeat);
        info!(
            heartbeat_secs = self.config.heartbeat_interval_secs,
            "Connection manager started"
        );
    }

    /// Run one connection from upgrade request to teardown.
    ///
    /// Returns the connection id once the connection has ended normally,
    /// or the error that stopped it before registration.
    pub async fn handle<H: Handshake>(&self, handshake: H) -> Result<ConnectionId, ConnectError> {
        let established = self.establish(handshake).await?;
        let id = established.id.clone();
        self.serve(established).await;
        Ok(id)
    }

    /// Admit, accept, authenticate and register one connection.
    ///
    /// Nothing is left registered when this returns an error; the
    /// transport, if it was accepted, has been closed with the error's
    /// close reason.
    pub async fn establish<H: Handshake>(
        &self,
        handshake: H,
    ) -> Result<Established, ConnectError> {
        let request = handshake.request().clone();

        if let Err(reason) = self
            .pool
            .can_accept(request.subject_hint.as_ref(), &request.source_address)
            .await
        {
            warn!(
                source = %request.source_address,
                subject = request.subject_hint.as_ref().map(SubjectId::as_str).unwrap_or_default(),
                reason = %reason,
                "Connection rejected"
            );
            handshake.reject(reason.close_reason()).await;
            return Err(reason.into());
        }

        let pending = self.pool.begin_pending();
        let mut lifecycle = Lifecycle::pending();
        let id = ConnectionId::generate();

        let Accepted { transport, inbound } = match handshake.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                lifecycle.advance(ConnectionState::Error)?;
                self.pool.record_failure();
                warn!(connection_id = %id, error = %e, "Handshake failed");
                return Err(e.into());
            }
        };
        debug!(connection_id = %id, source = %request.source_address, "Handshake accepted");

        lifecycle.advance(ConnectionState::Authenticating)?;
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| RequestId::from(&id));
        let request = ConnectionRequest {
            request_id: Some(request_id.clone()),
            ..request
        };

        let outcome = match self.authenticate(&id, &request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                lifecycle.advance(ConnectionState::Error)?;
                self.pool.record_failure();
                self.auth.forget(&request_id);
                warn!(connection_id = %id, error = %e, "Authentication failed");
                transport.close(e.close_reason()).await;
                return Err(e);
            }
        };
        let Some(subject) = outcome.subject.clone() else {
            lifecycle.advance(ConnectionState::Error)?;
            self.pool.record_failure();
            let e = ConnectError::AuthenticationFailed("no subject in outcome".to_string());
            transport.close(e.close_reason()).await;
            return Err(e);
        };

        let released = self.shutdown.child_token();
        let mut connection = Connection::new(
            id.clone(),
            subject.clone(),
            request.source_address.clone(),
            outcome.method,
            Arc::clone(&transport),
        )
        .with_release_token(released.clone())
        .with_metadata("request_id", request_id.as_str());
        if let Some(stage) = outcome.stage {
            connection = connection.with_metadata("auth_stage", stage.as_str());
        }

        if let Err(reason) = self.pool.add(connection).await {
            self.auth.forget(&request_id);
            transport.close(reason.close_reason()).await;
            return Err(reason.into());
        }
        lifecycle.advance(ConnectionState::Connected)?;
        drop(pending);

        let welcome = ServerMessage::ConnectionEstablished {
            connection_id: id.clone(),
            user_id: subject.clone(),
            timestamp: Utc::now(),
            token: outcome.credential.clone(),
        };
        if !self.send_to_connection(&id, &welcome).await {
            self.auth.forget(&request_id);
            return Err(TransportError::Send("confirmation not delivered".to_string()).into());
        }

        Ok(Established {
            id,
            subject,
            request_id,
            outcome,
            released,
            inbound,
            lifecycle,
        })
    }

    /// Run the chain until it settles, sleeping through `retry_needed`.
    async fn authenticate(
        &self,
        id: &ConnectionId,
        request: &ConnectionRequest,
    ) -> Result<AuthOutcome, ConnectError> {
        let cancel = self.shutdown.child_token();
        let timeout = self.config.auth_timeout();
        // Each granted retry is followed by at most one early call.
        let rounds = self.auth.retries().config().max_retries.saturating_add(1) * 2;

        let attempts = async {
            for _ in 0..rounds {
                let outcome = self.auth.authenticate(request).await;
                if outcome.status != AuthStatus::RetryNeeded {
                    return outcome;
                }
                let wait = outcome.retry_after.unwrap_or(Duration::ZERO);
                debug!(
                    connection_id = %id,
                    attempt = outcome.attempt().unwrap_or_default(),
                    wait_ms = wait.as_millis() as u64,
                    "Authentication retry scheduled"
                );
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
            }
            AuthOutcome::failed(AuthStage::RetryBackoff, "retry budget exhausted")
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ConnectError::Cancelled),
            settled = tokio::time::timeout(timeout, attempts) => match settled {
                Ok(outcome) if outcome.is_authenticated() => Ok(outcome),
                Ok(outcome) => Err(ConnectError::AuthenticationFailed(
                    outcome.error.unwrap_or_else(|| outcome.status.to_string()),
                )),
                Err(_) => Err(ConnectError::AuthenticationFailed(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                ))),
            },
        }
    }

    /// Read from a registered connection until it ends, then tear it down.
    ///
    /// Returns the final lifecycle state, `Disconnected` once teardown has
    /// run.
    pub async fn serve(&self, established: Established) -> ConnectionState {
        let Established {
            id,
            subject,
            request_id,
            released,
            mut inbound,
            mut lifecycle,
            ..
        } = established;

        let reason = loop {
            tokio::select! {
                biased;
                () = released.cancelled() => break CloseReason::ServerShutdown,
                frame = inbound.next_frame() => match frame {
                    None => break CloseReason::Normal,
                    Some(InboundFrame::Close(code)) => {
                        debug!(connection_id = %id, code, "Client closed");
                        break CloseReason::Normal;
                    }
                    Some(InboundFrame::Text(text)) => {
                        self.pool.touch(&id, text.len() as u64, 1, Direction::Received);
                        self.on_text(&id, &text).await;
                    }
                    Some(InboundFrame::Binary(len)) => {
                        self.pool.touch(&id, len as u64, 1, Direction::Received);
                    }
                    Some(InboundFrame::Control(len)) => {
                        self.pool.touch(&id, len as u64, 0, Direction::Received);
                    }
                },
            }
        };

        advance_teardown(&mut lifecycle, &id, ConnectionState::Disconnecting);
        // No-op when the pool already released it.
        self.pool.close(&id, reason).await;
        self.auth.forget(&request_id);
        advance_teardown(&mut lifecycle, &id, ConnectionState::Disconnected);

        debug!(
            connection_id = %id,
            subject = %subject,
            state = %lifecycle.state(),
            "Connection task finished"
        );
        lifecycle.state()
    }

    async fn on_text(&self, id: &ConnectionId, text: &str) {
        let reply = match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Ping) => Some(ServerMessage::Pong {
                timestamp: Utc::now(),
            }),
            Ok(ClientMessage::Pong) => None,
            Ok(ClientMessage::Subscribe { channel }) if channel.is_empty() => {
                Some(ServerMessage::error("invalid_channel", "channel name is empty"))
            }
            Ok(ClientMessage::Subscribe { channel }) => {
                self.pool.subscribe(id, &channel);
                debug!(connection_id = %id, channel = %channel, "Subscribed");
                Some(ServerMessage::Subscribed { channel })
            }
            Ok(ClientMessage::Unsubscribe { channel }) => {
                self.pool.unsubscribe(id, &channel);
                Some(ServerMessage::Unsubscribed { channel })
            }
            Err(e) => {
                debug!(connection_id = %id, error = %e, "Unparseable client message");
                Some(ServerMessage::error("invalid_message", e.to_string()))
            }
        };
        if let Some(reply) = reply {
            self.send_to_connection(id, &reply).await;
        }
    }

    /// Pool statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Stop accepting, cancel in-flight authentication and close every
    /// connection with `ServerShutdown`. Returns how many were closed.
    pub async fn shutdown(&self) -> usize {
        self.shutdown.cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let closed = self.pool.shutdown().await;
        info!(closed, "Connection manager shut down");
        closed
    }
}

/// Teardown always proceeds; a refused transition is only logged.
fn advance_teardown(lifecycle: &mut Lifecycle, id: &ConnectionId, next: ConnectionState) {
    if let Err(e) = lifecycle.advance(next) {
        warn!(connection_id = %id, error = %e, "Unexpected lifecycle transition");
    }
}

#[cfg(test)]
mod tests;
