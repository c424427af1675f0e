use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::*;
use crate::error::AdmissionError;
use crate::infrastructure::config::{AuthConfig, PoolConfig, RetryConfig};
use crate::testkit::transport::{mock_handshake, MockClient};
use crate::testkit::{config, token};

fn manager(max_connections: usize) -> Arc<ConnectionManager> {
    build(config::pool(max_connections), config::auth(), config::retry(), config::server())
}

fn build(
    pool: PoolConfig,
    auth: AuthConfig,
    retry: RetryConfig,
    server: ServerConfig,
) -> Arc<ConnectionManager> {
    let jwt = token::authenticator();
    let chain = Arc::new(AuthFallbackChain::new(jwt.clone(), jwt, auth, retry));
    Arc::new(ConnectionManager::new(config::healthy_pool(pool), chain, server))
}

fn request_for(subject: &str) -> ConnectionRequest {
    ConnectionRequest::new("10.0.0.1")
        .with_credential(token::valid(subject))
        .with_subject_hint(subject)
}

async fn establish(
    manager: &ConnectionManager,
    request: ConnectionRequest,
) -> (Result<Established, ConnectError>, MockClient) {
    let (handshake, client) = mock_handshake(request);
    (manager.establish(handshake).await, client)
}

/// Run a full connection task and wait for its confirmation.
async fn spawn_connection(
    manager: &Arc<ConnectionManager>,
    request: ConnectionRequest,
) -> (JoinHandle<Result<ConnectionId, ConnectError>>, MockClient) {
    let (handshake, client) = mock_handshake(request);
    let task = tokio::spawn({
        let manager = Arc::clone(manager);
        async move { manager.handle(handshake).await }
    });
    client.transport.wait_for_sent(1).await;
    (task, client)
}

#[tokio::test]
async fn registered_connection_receives_confirmation() {
    let manager = manager(10);
    let (established, client) = establish(&manager, request_for("alice")).await;
    let established = established.unwrap();

    assert_eq!(manager.pool().active_count(), 1);
    assert_eq!(manager.pool().pending_count(), 0);
    match &client.transport.sent()[0] {
        ServerMessage::ConnectionEstablished {
            connection_id,
            user_id,
            token,
            ..
        } => {
            assert_eq!(connection_id, established.id());
            assert_eq!(user_id.as_str(), "alice");
            assert!(token.is_none());
        }
        other => panic!("unexpected first message {other:?}"),
    }

    let info = manager.pool().get(established.id()).unwrap();
    assert_eq!(info.metadata["auth_stage"], "normal_validation");
    assert!(info.metadata["request_id"].starts_with("conn-"));
}

#[tokio::test]
async fn capacity_frees_up_after_disconnect() {
    let manager = manager(2);

    let (a, client_a) = establish(&manager, request_for("a")).await;
    let a = a.unwrap();
    let (b, _client_b) = establish(&manager, request_for("b")).await;
    b.unwrap();

    let (c, client_c) = establish(&manager, request_for("c")).await;
    assert!(matches!(
        c,
        Err(ConnectError::AdmissionRejected(AdmissionError::Capacity { current: 2, max: 2 }))
    ));
    assert_eq!(client_c.rejected(), Some(CloseReason::CapacityExceeded));
    assert!(client_c.transport.sent().is_empty());

    assert_eq!(a.state(), ConnectionState::Connected);
    client_a.handle.close();
    assert_eq!(manager.serve(a).await, ConnectionState::Disconnected);
    assert_eq!(client_a.transport.close_reason(), Some(CloseReason::Normal));
    assert_eq!(manager.pool().active_count(), 1);

    let (c, _client_c) = establish(&manager, request_for("c")).await;
    assert!(c.is_ok());
    assert_eq!(manager.stats().total_rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn bad_signature_fails_authentication() {
    let manager = manager(10);
    let forged = token::sign_with("other-secret", &token::claims("alice", 3600));

    let (result, client) = establish(
        &manager,
        ConnectionRequest::new("10.0.0.1").with_credential(forged),
    )
    .await;

    assert!(matches!(result, Err(ConnectError::AuthenticationFailed(_))));
    assert_eq!(
        client.transport.close_reason(),
        Some(CloseReason::AuthenticationFailed)
    );
    assert!(client.transport.sent().is_empty());

    let stats = manager.stats();
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.pending_connections, 0);
    assert_eq!(stats.total_failed, 1);
    assert!(manager.auth().retries().is_empty());
}

#[tokio::test]
async fn refreshed_credential_is_sent_with_confirmation() {
    let manager = manager(10);
    let (result, client) = establish(
        &manager,
        ConnectionRequest::new("10.0.0.1")
            .with_credential(token::expired("alice"))
            .with_subject_hint("alice"),
    )
    .await;

    let established = result.unwrap();
    assert_eq!(established.outcome().stage, Some(AuthStage::TokenRefresh));
    match &client.transport.sent()[0] {
        ServerMessage::ConnectionEstablished { token, .. } => assert!(token.is_some()),
        other => panic!("unexpected first message {other:?}"),
    }
}

// Without a request id the manager synthesizes one, so the retry stage
// backs off before guest mode is reached.
#[tokio::test(start_paused = true)]
async fn guest_connection_is_registered_as_guest() {
    let mut auth = config::auth();
    auth.guest_mode = true;
    let manager = build(config::pool(10), auth, config::retry(), config::server());

    let (result, client) = establish(&manager, ConnectionRequest::new("10.0.0.9")).await;
    let established = result.unwrap();

    assert!(established.subject().is_guest());
    assert_eq!(established.outcome().status, AuthStatus::FallbackUsed);
    let info = manager.pool().get(established.id()).unwrap();
    assert_eq!(info.auth_method, crate::domain::AuthMethod::Guest);
    match &client.transport.sent()[0] {
        ServerMessage::ConnectionEstablished { token, .. } => assert!(token.is_some()),
        other => panic!("unexpected first message {other:?}"),
    }
}

#[tokio::test]
async fn failed_accept_counts_as_failure() {
    let manager = manager(10);
    let (handshake, _client) = mock_handshake(request_for("alice"));

    let result = manager.establish(handshake.failing_accept()).await;
    assert!(matches!(result, Err(ConnectError::Transport(_))));

    let stats = manager.stats();
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.pending_connections, 0);
}

#[tokio::test(start_paused = true)]
async fn authentication_is_bounded_by_timeout() {
    let mut server = config::server();
    server.auth_timeout_secs = 1;
    let mut retry = config::retry();
    retry.base_delay_ms = 5_000;
    retry.max_delay_ms = 30_000;
    let manager = build(config::pool(10), config::auth(), retry, server);

    let (result, client) = establish(
        &manager,
        ConnectionRequest::new("10.0.0.1").with_credential("a.b.c"),
    )
    .await;

    match result {
        Err(ConnectError::AuthenticationFailed(reason)) => assert!(reason.contains("timed out")),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(
        client.transport.close_reason(),
        Some(CloseReason::AuthenticationFailed)
    );
}

#[tokio::test]
async fn broadcast_isolates_failed_sends() {
    let manager = manager(10);
    let mut clients = Vec::new();
    let mut sessions = Vec::new();
    for subject in ["alice", "bob", "carol"] {
        let (established, client) = establish(&manager, request_for(subject)).await;
        sessions.push(established.unwrap());
        clients.push(client);
    }
    clients[1].transport.set_failing(true);

    let delivered = manager
        .broadcast(&ServerMessage::channel("news", serde_json::json!({"n": 1})), None)
        .await;

    assert_eq!(delivered, 2);
    assert_eq!(
        clients[1].transport.close_reason(),
        Some(CloseReason::SendFailure)
    );
    assert_eq!(manager.pool().active_count(), 2);
    assert_eq!(clients[0].transport.sent_kinds().last(), Some(&"channel_message"));
    assert_eq!(clients[2].transport.sent_kinds().last(), Some(&"channel_message"));
}

#[tokio::test]
async fn broadcast_can_exclude_a_subject() {
    let manager = manager(10);
    let (_a, client_a) = establish(&manager, request_for("alice")).await;
    let (_b, client_b) = establish(&manager, request_for("bob")).await;

    let alice = SubjectId::from("alice");
    let delivered = manager
        .broadcast(&ServerMessage::heartbeat(), Some(&alice))
        .await;

    assert_eq!(delivered, 1);
    assert_eq!(client_a.transport.sent().len(), 1);
    assert_eq!(client_b.transport.sent().len(), 2);
}

#[tokio::test]
async fn send_to_subject_reaches_every_connection_of_subject() {
    let manager = manager(10);
    let (_a1, client_a1) = establish(&manager, request_for("alice")).await;
    let (_a2, client_a2) = establish(&manager, request_for("alice")).await;
    let (_b, client_b) = establish(&manager, request_for("bob")).await;

    let update = ServerMessage::ExecutionUpdate {
        execution_id: "exec-1".to_string(),
        status: "running".to_string(),
        progress: Some(0.5),
        detail: None,
        timestamp: Utc::now(),
    };
    assert_eq!(
        manager.send_to_subject(&SubjectId::from("alice"), &update).await,
        2
    );
    assert_eq!(client_a1.transport.sent_kinds(), ["connection_established", "execution_update"]);
    assert_eq!(client_a2.transport.sent_kinds(), ["connection_established", "execution_update"]);
    assert_eq!(client_b.transport.sent_kinds(), ["connection_established"]);

    assert_eq!(
        manager.send_to_subject(&SubjectId::from("nobody"), &update).await,
        0
    );
}

#[tokio::test]
async fn channel_subscription_drives_delivery() {
    let manager = manager(10);
    let (task, client) = spawn_connection(&manager, request_for("alice")).await;
    let (_other, other_client) = spawn_connection(&manager, request_for("bob")).await;

    client.handle.send_message(&ClientMessage::Subscribe {
        channel: "jobs".to_string(),
    });
    let sent = client.transport.wait_for_sent(2).await;
    assert_eq!(
        sent[1],
        ServerMessage::Subscribed {
            channel: "jobs".to_string()
        }
    );

    let message = ServerMessage::channel("jobs", serde_json::json!({"id": 7}));
    assert_eq!(manager.send_to_channel("jobs", &message).await, 1);
    assert_eq!(other_client.transport.sent().len(), 1);

    client.handle.send_message(&ClientMessage::Unsubscribe {
        channel: "jobs".to_string(),
    });
    client.transport.wait_for_sent(4).await;
    assert_eq!(manager.send_to_channel("jobs", &message).await, 0);

    client.handle.close();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn ping_and_invalid_messages_get_replies() {
    let manager = manager(10);
    let (task, client) = spawn_connection(&manager, request_for("alice")).await;

    client.handle.send_message(&ClientMessage::Ping);
    client.handle.send_text("{not json");
    let sent = client.transport.wait_for_sent(3).await;

    assert_eq!(sent[1].kind(), "pong");
    match &sent[2] {
        ServerMessage::Error { code, .. } => assert_eq!(code, "invalid_message"),
        other => panic!("expected error reply, got {other:?}"),
    }
    assert!(client.transport.close_reason().is_none());

    client.handle.close();
    let id = task.await.unwrap().unwrap();
    assert!(manager.pool().get(&id).is_none());
    assert_eq!(client.transport.close_reason(), Some(CloseReason::Normal));
}

#[tokio::test]
async fn inbound_traffic_is_recorded() {
    let manager = manager(10);
    let (task, client) = spawn_connection(&manager, request_for("alice")).await;

    client.handle.send_message(&ClientMessage::Ping);
    client.transport.wait_for_sent(2).await;

    let info = manager.pool().get_by_subject(&SubjectId::from("alice"))[0].clone();
    assert_eq!(info.counters.messages_received, 1);
    assert_eq!(info.counters.messages_sent, 2);

    client.handle.close();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn heartbeats_do_not_count_as_activity() {
    let manager = manager(10);
    let (established, client) = establish(&manager, request_for("alice")).await;
    let established = established.unwrap();

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(manager.send_heartbeat().await, 1);

    assert_eq!(client.transport.sent_kinds(), ["connection_established", "heartbeat"]);
    let info = manager.pool().get(established.id()).unwrap();
    assert!(info.idle_secs >= 30.0);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_task_runs_on_interval() {
    let manager = manager(10);
    manager.start();
    let (_established, client) = establish(&manager, request_for("alice")).await;

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(client.transport.sent_kinds(), ["connection_established", "heartbeat"]);

    manager.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_connections_and_refuses_new_ones() {
    let manager = manager(10);
    let (task, client) = spawn_connection(&manager, request_for("alice")).await;

    assert_eq!(manager.shutdown().await, 1);
    assert!(manager.is_shutting_down());
    assert_eq!(client.transport.wait_closed().await, CloseReason::ServerShutdown);
    assert!(task.await.unwrap().is_ok());
    assert_eq!(manager.pool().active_count(), 0);

    let (result, late) = establish(&manager, request_for("bob")).await;
    assert!(matches!(
        result,
        Err(ConnectError::AdmissionRejected(AdmissionError::ShuttingDown))
    ));
    assert_eq!(late.rejected(), Some(CloseReason::ServerShutdown));
    assert_eq!(manager.shutdown().await, 0);
}
