use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::adapter::outbound::session::InMemorySessionStore;
use crate::domain::AuthStatus;
use crate::testkit::{config, token};

fn chain() -> AuthFallbackChain {
    chain_with(config::auth())
}

fn chain_with(auth: AuthConfig) -> AuthFallbackChain {
    let jwt = token::authenticator();
    AuthFallbackChain::new(jwt.clone(), jwt, auth, config::retry())
}

fn guest_chain() -> AuthFallbackChain {
    let mut auth = config::auth();
    auth.guest_mode = true;
    auth.guest_permissions = vec!["read_only".into(), "presence".into()];
    chain_with(auth)
}

fn with_sessions(chain: AuthFallbackChain) -> (AuthFallbackChain, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new());
    (chain.with_session_store(store.clone()), store)
}

fn request() -> ConnectionRequest {
    ConnectionRequest::new("10.0.0.1")
}

#[tokio::test]
async fn valid_credential_succeeds_at_first_stage() {
    let outcome = chain()
        .authenticate(&request().with_credential(token::valid("alice")))
        .await;

    assert_eq!(outcome.status, AuthStatus::Success);
    assert_eq!(outcome.stage, Some(AuthStage::NormalValidation));
    assert_eq!(outcome.method, AuthMethod::Jwt);
    assert_eq!(outcome.subject, Some(SubjectId::from("alice")));
    assert!(outcome.credential.is_none());
}

#[tokio::test]
async fn valid_guest_credential_reports_guest_method() {
    let mut claims = token::claims("guest_abc", 600);
    claims.auth_type = Some(GUEST_AUTH_TYPE.to_string());

    let outcome = chain()
        .authenticate(&request().with_credential(token::sign(&claims)))
        .await;

    assert_eq!(outcome.status, AuthStatus::Success);
    assert_eq!(outcome.method, AuthMethod::Guest);
}

#[tokio::test]
async fn expired_credential_with_matching_hint_is_refreshed() {
    let chain = chain();
    let expired = token::expired("alice");
    let old = token::authenticator().decode_ignoring_expiry(&expired).unwrap();

    let outcome = chain
        .authenticate(
            &request()
                .with_credential(expired)
                .with_subject_hint("alice"),
        )
        .await;

    assert_eq!(outcome.status, AuthStatus::Success);
    assert_eq!(outcome.stage, Some(AuthStage::TokenRefresh));
    assert_eq!(outcome.subject, Some(SubjectId::from("alice")));

    let fresh = token::authenticator()
        .validate(outcome.credential.as_deref().unwrap())
        .unwrap();
    assert!(fresh.exp > old.exp);
    assert!(fresh.refreshed);
    assert_eq!(fresh.original_iat, Some(old.iat));
    assert_eq!(outcome.metadata["refreshed"], serde_json::json!(true));
}

#[tokio::test]
async fn audience_claim_does_not_block_validation() {
    let mut claims = token::claims("alice", 3600);
    claims
        .extra
        .insert("aud".to_string(), serde_json::json!("authenticated"));

    let outcome = chain()
        .authenticate(&request().with_credential(token::sign(&claims)))
        .await;

    assert_eq!(outcome.status, AuthStatus::Success);
    assert_eq!(outcome.stage, Some(AuthStage::NormalValidation));
    assert_eq!(outcome.subject, Some(SubjectId::from("alice")));
}

fn expired_guest(sub: &str) -> String {
    let mut claims = token::claims(sub, -60);
    claims.auth_type = Some(GUEST_AUTH_TYPE.to_string());
    claims.permissions = vec!["read_only".into()];
    token::sign(&claims)
}

#[tokio::test]
async fn expired_guest_credential_refreshes_as_short_lived_guest() {
    let outcome = guest_chain()
        .authenticate(
            &request()
                .with_credential(expired_guest("guest_abc"))
                .with_subject_hint("guest_abc"),
        )
        .await;

    assert_eq!(outcome.status, AuthStatus::Success);
    assert_eq!(outcome.stage, Some(AuthStage::TokenRefresh));
    assert_eq!(outcome.method, AuthMethod::Guest);

    let fresh = token::authenticator()
        .validate(outcome.credential.as_deref().unwrap())
        .unwrap();
    let lifetime = fresh.exp - fresh.iat;
    assert_eq!(lifetime, config::auth().guest_lifetime_secs as i64);
    assert_eq!(fresh.auth_type.as_deref(), Some(GUEST_AUTH_TYPE));
    assert_eq!(fresh.permissions, vec!["read_only", "presence"]);
}

#[tokio::test]
async fn expired_guest_credential_is_not_refreshed_when_guest_mode_is_off() {
    let outcome = chain()
        .authenticate(
            &request()
                .with_credential(expired_guest("guest_abc"))
                .with_subject_hint("guest_abc"),
        )
        .await;

    assert_eq!(outcome.status, AuthStatus::CriticalError);
    assert!(outcome.credential.is_none());
    assert!(outcome.error.unwrap().contains("guest credentials are not refreshed"));
}

#[tokio::test]
async fn refresh_keeps_first_issue_time_across_refreshes() {
    let mut claims = token::claims("alice", -60);
    claims.refreshed = true;
    claims.original_iat = Some(1_000);

    let outcome = chain()
        .authenticate(
            &request()
                .with_credential(token::sign(&claims))
                .with_subject_hint("alice"),
        )
        .await;

    let fresh = token::authenticator()
        .validate(outcome.credential.as_deref().unwrap())
        .unwrap();
    assert_eq!(fresh.original_iat, Some(1_000));
}

#[tokio::test]
async fn refresh_requires_matching_hint() {
    let outcome = chain()
        .authenticate(
            &request()
                .with_credential(token::expired("alice"))
                .with_subject_hint("mallory"),
        )
        .await;

    assert_eq!(outcome.status, AuthStatus::CriticalError);
    assert!(outcome.error.unwrap().contains("does not match"));
}

#[tokio::test]
async fn bad_signature_is_never_refreshed() {
    let forged = token::sign_with("other-secret", &token::claims("alice", -3600));
    let outcome = chain()
        .authenticate(&request().with_credential(forged).with_subject_hint("alice"))
        .await;

    assert!(!outcome.is_authenticated());
    assert!(outcome.credential.is_none());
}

#[tokio::test]
async fn session_cookie_authenticates() {
    let (chain, store) = with_sessions(chain());
    store.insert("c1", SubjectId::from("carol"), Duration::from_secs(60));

    let outcome = chain
        .authenticate(&request().with_session_cookie("c1"))
        .await;

    assert_eq!(outcome.status, AuthStatus::Success);
    assert_eq!(outcome.stage, Some(AuthStage::AlternativeAuth));
    assert_eq!(outcome.method, AuthMethod::Session);
    assert_eq!(outcome.subject, Some(SubjectId::from("carol")));
}

#[tokio::test]
async fn session_cookie_for_other_subject_is_refused() {
    let (chain, store) = with_sessions(chain());
    store.insert("c1", SubjectId::from("carol"), Duration::from_secs(60));

    let outcome = chain
        .authenticate(
            &request()
                .with_session_cookie("c1")
                .with_subject_hint("dave"),
        )
        .await;

    assert!(!outcome.is_authenticated());
}

#[tokio::test]
async fn active_session_for_hint_authenticates() {
    let (chain, store) = with_sessions(chain());
    store.insert("c1", SubjectId::from("erin"), Duration::from_secs(60));

    let outcome = chain
        .authenticate(&request().with_subject_hint("erin"))
        .await;

    assert_eq!(outcome.stage, Some(AuthStage::AlternativeAuth));
    assert_eq!(outcome.subject, Some(SubjectId::from("erin")));
}

#[tokio::test(start_paused = true)]
async fn retries_are_spaced_then_exhausted() {
    let chain = chain();
    let req = request().with_request_id("req-1");

    let first = chain.authenticate(&req).await;
    assert_eq!(first.status, AuthStatus::RetryNeeded);
    assert_eq!(first.attempt(), Some(1));
    assert_eq!(first.retry_after, Some(Duration::ZERO));

    let early = chain.authenticate(&req).await;
    assert_eq!(early.status, AuthStatus::RetryNeeded);
    assert_eq!(early.retry_after, Some(Duration::from_millis(100)));
    assert_eq!(early.attempt(), Some(1));

    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(chain.authenticate(&req).await.attempt(), Some(2));

    tokio::time::advance(Duration::from_millis(200)).await;
    assert_eq!(chain.authenticate(&req).await.attempt(), Some(3));

    tokio::time::advance(Duration::from_millis(400)).await;
    let exhausted = chain.authenticate(&req).await;
    assert_eq!(exhausted.status, AuthStatus::Failed);
    assert_eq!(exhausted.stage, Some(AuthStage::RetryBackoff));
    assert_eq!(exhausted.metadata["attempts"], serde_json::json!(3));

    // Giving up resets the tracker for this request id.
    assert_eq!(chain.retries().attempts(&RequestId::from("req-1")), 0);
    assert_eq!(chain.authenticate(&req).await.attempt(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn success_clears_retry_state() {
    let chain = chain();
    let rid = RequestId::from("req-2");
    chain.authenticate(&request().with_request_id("req-2")).await;
    assert_eq!(chain.retries().attempts(&rid), 1);

    let outcome = chain
        .authenticate(
            &request()
                .with_request_id("req-2")
                .with_credential(token::valid("alice")),
        )
        .await;
    assert!(outcome.is_authenticated());
    assert_eq!(chain.retries().attempts(&rid), 0);
}

#[tokio::test]
async fn without_request_id_or_guest_everything_fails() {
    let outcome = chain()
        .authenticate(&request().with_credential("not-a-token"))
        .await;

    assert_eq!(outcome.status, AuthStatus::CriticalError);
    assert_eq!(outcome.method, AuthMethod::FallbackFailed);
    assert!(outcome.subject.is_none());
    let errors = outcome.metadata["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 3);
}

#[tokio::test]
async fn guest_mode_issues_reduced_credential() {
    let outcome = guest_chain().authenticate(&request()).await;

    assert_eq!(outcome.status, AuthStatus::FallbackUsed);
    assert_eq!(outcome.stage, Some(AuthStage::GuestMode));
    assert_eq!(outcome.method, AuthMethod::Guest);
    let subject = outcome.subject.clone().unwrap();
    assert!(subject.is_guest());

    let claims = token::authenticator()
        .validate(outcome.credential.as_deref().unwrap())
        .unwrap();
    assert_eq!(claims.sub, subject.as_str());
    assert_eq!(claims.auth_type.as_deref(), Some(GUEST_AUTH_TYPE));
    assert_eq!(claims.permissions, vec!["read_only", "presence"]);
}

#[tokio::test(start_paused = true)]
async fn guest_mode_follows_exhausted_retries() {
    let chain = guest_chain();
    let req = request().with_request_id("req-3");

    for _ in 0..3 {
        assert_eq!(chain.authenticate(&req).await.status, AuthStatus::RetryNeeded);
        tokio::time::advance(Duration::from_secs(1)).await;
    }
    let outcome = chain.authenticate(&req).await;
    assert_eq!(outcome.status, AuthStatus::FallbackUsed);
    assert_eq!(outcome.method, AuthMethod::Guest);
}

#[tokio::test]
async fn guest_is_not_used_when_disabled() {
    let outcome = chain().authenticate(&request()).await;
    assert_ne!(outcome.method, AuthMethod::Guest);
    assert!(!outcome.is_authenticated());
}
