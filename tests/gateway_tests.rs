//! Integration tests for admission, authentication and housekeeping through
//! the public [`ConnectionManager`] API, using testkit mocks.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use wsgate::application::auth::AuthFallbackChain;
use wsgate::application::manager::ConnectionManager;
use wsgate::application::pool::ConnectionPool;
use wsgate::domain::{
    AuthStage, AuthStatus, CloseReason, ConnectionId, ConnectionRequest, ServerMessage,
};
use wsgate::error::{AdmissionError, ConnectError};
use wsgate::infrastructure::config::PoolConfig;
use wsgate::port::TokenValidator;
use wsgate::testkit::probe::FixedProbe;
use wsgate::testkit::transport::{mock_handshake, MockClient};
use wsgate::testkit::{config, token};

fn manager_over(pool: Arc<ConnectionPool>) -> Arc<ConnectionManager> {
    let jwt = token::authenticator();
    let chain = Arc::new(AuthFallbackChain::new(
        jwt.clone(),
        jwt,
        config::auth(),
        config::retry(),
    ));
    Arc::new(ConnectionManager::new(pool, chain, config::server()))
}

fn request_for(subject: &str, source: &str) -> ConnectionRequest {
    ConnectionRequest::new(source)
        .with_credential(token::valid(subject))
        .with_subject_hint(subject)
}

/// Run a connection to completion in the background.
fn spawn(
    manager: &Arc<ConnectionManager>,
    request: ConnectionRequest,
) -> (JoinHandle<Result<ConnectionId, ConnectError>>, MockClient) {
    let (handshake, client) = mock_handshake(request);
    let manager = Arc::clone(manager);
    let task = tokio::spawn(async move { manager.handle(handshake).await });
    (task, client)
}

/// Spawn a connection and wait until it is confirmed.
async fn connect(
    manager: &Arc<ConnectionManager>,
    request: ConnectionRequest,
) -> (JoinHandle<Result<ConnectionId, ConnectError>>, MockClient) {
    let (task, client) = spawn(manager, request);
    client.transport.wait_for_sent(1).await;
    (task, client)
}

#[tokio::test]
async fn per_subject_and_per_source_limits_are_enforced() {
    let pool = config::healthy_pool(PoolConfig {
        max_connections_per_subject: 2,
        max_connections_per_source: 3,
        ..config::pool(10)
    });
    let manager = manager_over(pool);

    let _a1 = connect(&manager, request_for("alice", "10.0.0.1")).await;
    let _a2 = connect(&manager, request_for("alice", "10.0.0.2")).await;

    let (task, client) = spawn(&manager, request_for("alice", "10.0.0.3"));
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ConnectError::AdmissionRejected(AdmissionError::SubjectLimit { max: 2, .. })
    ));
    assert_eq!(client.rejected(), Some(CloseReason::CapacityExceeded));

    let _b1 = connect(&manager, request_for("bob", "10.0.0.1")).await;
    let _c1 = connect(&manager, request_for("carol", "10.0.0.1")).await;
    let (task, client) = spawn(&manager, request_for("dave", "10.0.0.1"));
    assert!(matches!(
        task.await.unwrap().unwrap_err(),
        ConnectError::AdmissionRejected(AdmissionError::SourceLimit { max: 3, .. })
    ));
    assert_eq!(client.rejected(), Some(CloseReason::CapacityExceeded));

    let stats = manager.stats();
    assert_eq!(stats.active_connections, 4);
    assert_eq!(stats.total_rejected, 2);
    assert_eq!(stats.connections_by_subject.get("alice"), Some(&2));
    assert_eq!(stats.connections_by_source.get("10.0.0.1"), Some(&3));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn overload_limits_admission_to_soft_limit() {
    let probe = Arc::new(FixedProbe::new(99.0, 10.0));
    let pool = Arc::new(
        ConnectionPool::new(config::pool(10), config::monitor(probe.clone())).unwrap(),
    );
    let manager = manager_over(pool);

    let mut clients = Vec::new();
    for i in 0..8 {
        clients.push(connect(&manager, request_for(&format!("user-{i}"), "10.0.0.1")).await);
    }

    let (task, client) = spawn(&manager, request_for("user-8", "10.0.0.1"));
    assert!(matches!(
        task.await.unwrap().unwrap_err(),
        ConnectError::AdmissionRejected(AdmissionError::ResourceOverloaded { soft_limit: 8, .. })
    ));
    assert_eq!(client.rejected(), Some(CloseReason::CapacityExceeded));

    // Recovery is visible once the cached status expires.
    probe.set(20.0, 10.0);
    tokio::time::advance(Duration::from_secs(2)).await;
    let _ninth = connect(&manager, request_for("user-8", "10.0.0.1")).await;
    assert_eq!(manager.stats().active_connections, 9);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn silent_connection_is_swept_despite_heartbeats() {
    let manager = manager_over(config::healthy_pool(config::pool(10)));
    manager.start();

    let (task, client) = connect(&manager, request_for("alice", "10.0.0.1")).await;

    tokio::time::advance(Duration::from_secs(31)).await;
    let sent = client.transport.wait_for_sent(2).await;
    assert!(matches!(sent[1], ServerMessage::Heartbeat { .. }));

    tokio::time::advance(Duration::from_secs(44)).await;
    assert_eq!(client.transport.wait_closed().await, CloseReason::IdleTimeout);
    task.await.unwrap().unwrap();

    let stats = manager.stats();
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.total_closed, 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn expired_credential_with_hint_is_refreshed() {
    let manager = manager_over(config::healthy_pool(config::pool(10)));

    let request = ConnectionRequest::new("10.0.0.1")
        .with_credential(token::expired("alice"))
        .with_subject_hint("alice");
    let (task, client) = connect(&manager, request).await;

    let sent = client.transport.sent();
    let ServerMessage::ConnectionEstablished { user_id, token: Some(fresh), .. } = &sent[0] else {
        panic!("expected a confirmation carrying a refreshed credential");
    };
    assert_eq!(user_id.as_str(), "alice");

    let claims = token::authenticator().validate(fresh).unwrap();
    assert!(claims.refreshed);
    assert!(claims.original_iat.is_some());

    client.handle.close();
    task.await.unwrap().unwrap();
    assert_eq!(client.transport.close_reason(), Some(CloseReason::Normal));
}

#[tokio::test]
async fn chain_reports_critical_error_without_request_id() {
    let jwt = token::authenticator();
    let chain = AuthFallbackChain::new(jwt.clone(), jwt, config::auth(), config::retry());

    let outcome = chain
        .authenticate(&ConnectionRequest::new("10.0.0.1").with_credential("garbage"))
        .await;

    assert_eq!(outcome.status, AuthStatus::CriticalError);
    assert!(outcome.subject.is_none());
    let error = outcome.error.unwrap();
    assert!(error.contains(AuthStage::NormalValidation.as_str()));
    assert!(error.contains(AuthStage::AlternativeAuth.as_str()));
}
