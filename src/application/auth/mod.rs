//! Authentication fallback chain.
//!
//! Stages run in order and the first one that authenticates wins:
//!
//! 1. **Normal validation** of the presented credential.
//! 2. **Token refresh**: with a subject hint, an expired but correctly
//!    signed credential for that subject is exchanged for a fresh one.
//! 3. **Alternative authentication** against the [`SessionStore`], by
//!    session cookie or by active session for the hinted subject.
//! 4. **Retry with backoff**, keyed by request id (see [`RetryTracker`]).
//! 5. **Guest mode**, only when enabled.
//!
//! No stage returns an error to the caller. Each converts its own failure
//! into a message, and when nothing succeeds the messages are aggregated
//! into a `critical_error` outcome.

mod retry;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

pub use retry::{RetryDecision, RetryTracker};

use crate::domain::{
    AuthMethod, AuthOutcome, AuthStage, Claims, ConnectionRequest, RequestId, SubjectId,
};
use crate::error::TokenError;
use crate::infrastructure::config::{AuthConfig, RetryConfig};
use crate::port::{SessionStore, TokenIssuer, TokenValidator};

/// `auth_type` claim carried by guest credentials.
pub const GUEST_AUTH_TYPE: &str = "guest";

/// Ordered authentication strategies over pluggable collaborators.
pub struct AuthFallbackChain {
    validator: Arc<dyn TokenValidator>,
    issuer: Arc<dyn TokenIssuer>,
    sessions: Option<Arc<dyn SessionStore>>,
    retries: RetryTracker,
    config: AuthConfig,
}

impl AuthFallbackChain {
    pub fn new(
        validator: Arc<dyn TokenValidator>,
        issuer: Arc<dyn TokenIssuer>,
        config: AuthConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            validator,
            issuer,
            sessions: None,
            retries: RetryTracker::new(retry),
            config,
        }
    }

    /// Enable the alternative-authentication stage.
    #[must_use]
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub const fn retries(&self) -> &RetryTracker {
        &self.retries
    }

    /// Drop retry state for an abandoned request.
    pub fn forget(&self, request_id: &RequestId) {
        self.retries.reset(request_id);
    }

    /// Run the chain for one connection request.
    pub async fn authenticate(&self, request: &ConnectionRequest) -> AuthOutcome {
        let mut errors: Vec<String> = Vec::new();
        let credential = request.credential.as_deref().filter(|c| !c.is_empty());

        match self.validate(credential) {
            Ok(outcome) => return self.finish(request, outcome),
            Err(e) => {
                debug!(stage = %AuthStage::NormalValidation, error = %e, "Auth stage failed");
                errors.push(format!("{}: {e}", AuthStage::NormalValidation));
            }
        }

        match &request.subject_hint {
            Some(hint) => match self.refresh(credential, hint) {
                Ok(outcome) => return self.finish(request, outcome),
                Err(e) => {
                    debug!(stage = %AuthStage::TokenRefresh, error = %e, "Auth stage failed");
                    errors.push(format!("{}: {e}", AuthStage::TokenRefresh));
                }
            },
            None => errors.push(format!("{}: no subject hint", AuthStage::TokenRefresh)),
        }

        match self.alternative(request).await {
            Ok(outcome) => return self.finish(request, outcome),
            Err(e) => {
                debug!(stage = %AuthStage::AlternativeAuth, error = %e, "Auth stage failed");
                errors.push(format!("{}: {e}", AuthStage::AlternativeAuth));
            }
        }

        if let Some(request_id) = &request.request_id {
            match self.retries.check(request_id) {
                RetryDecision::Proceed { attempt } => {
                    debug!(request_id = %request_id, attempt, "Retry granted");
                    return AuthOutcome::retry_needed(Duration::ZERO, attempt);
                }
                RetryDecision::Wait { remaining, attempt } => {
                    debug!(
                        request_id = %request_id,
                        attempt,
                        remaining_ms = remaining.as_millis() as u64,
                        "Retry requested too early"
                    );
                    return AuthOutcome::retry_needed(remaining, attempt);
                }
                RetryDecision::Exhausted { attempts } => {
                    self.retries.reset(request_id);
                    errors.push(format!(
                        "{}: gave up after {attempts} attempts",
                        AuthStage::RetryBackoff
                    ));
                    if !self.config.guest_mode {
                        warn!(
                            request_id = %request_id,
                            attempts,
                            "Authentication retries exhausted"
                        );
                        return AuthOutcome::failed(AuthStage::RetryBackoff, errors.join("; "))
                            .with_metadata("attempts", attempts);
                    }
                }
            }
        }

        if self.config.guest_mode {
            match self.guest() {
                Ok(outcome) => return self.finish(request, outcome),
                Err(e) => {
                    warn!(error = %e, "Guest credential could not be issued");
                    errors.push(format!("{}: {e}", AuthStage::GuestMode));
                }
            }
        }

        warn!(stages = errors.len(), "All authentication methods failed");
        AuthOutcome::critical(&errors)
    }

    fn finish(&self, request: &ConnectionRequest, outcome: AuthOutcome) -> AuthOutcome {
        if let Some(request_id) = &request.request_id {
            self.retries.reset(request_id);
        }
        info!(
            subject = outcome.subject.as_ref().map(SubjectId::as_str).unwrap_or_default(),
            stage = outcome.stage.map(AuthStage::as_str).unwrap_or_default(),
            method = %outcome.method,
            status = %outcome.status,
            "Authenticated"
        );
        outcome
    }

    fn validate(&self, credential: Option<&str>) -> Result<AuthOutcome, TokenError> {
        let credential = credential.ok_or(TokenError::Empty)?;
        let claims = self.validator.validate(credential)?;
        let method = if claims.auth_type.as_deref() == Some(GUEST_AUTH_TYPE) {
            AuthMethod::Guest
        } else {
            AuthMethod::Jwt
        };
        Ok(AuthOutcome::success(
            AuthStage::NormalValidation,
            method,
            SubjectId::new(claims.sub),
        ))
    }

    fn refresh(
        &self,
        credential: Option<&str>,
        hint: &SubjectId,
    ) -> Result<AuthOutcome, TokenError> {
        let credential = credential.ok_or(TokenError::Empty)?;
        let previous = self.validator.decode_ignoring_expiry(credential)?;
        if previous.sub != hint.as_str() {
            return Err(TokenError::SubjectMismatch {
                expected: hint.to_string(),
                actual: previous.sub,
            });
        }

        // Guest credentials stay guest credentials: same short lifetime,
        // current guest permissions, and only while guest mode is on.
        let is_guest = previous.auth_type.as_deref() == Some(GUEST_AUTH_TYPE);
        if is_guest && !self.config.guest_mode {
            return Err(TokenError::Rejected(
                "guest credentials are not refreshed while guest mode is off".to_string(),
            ));
        }
        let (lifetime_secs, method, permissions) = if is_guest {
            (
                self.config.guest_lifetime_secs,
                AuthMethod::Guest,
                self.config.guest_permissions.clone(),
            )
        } else {
            (
                self.config.refresh_lifetime_secs,
                AuthMethod::Jwt,
                previous.permissions.clone(),
            )
        };

        let now = Utc::now().timestamp();
        let original_iat = previous.original_iat.unwrap_or(previous.iat);
        let claims = Claims {
            exp: now + lifetime_secs as i64,
            iat: now,
            permissions,
            refreshed: true,
            original_iat: Some(original_iat),
            ..previous
        };
        let token = self.issuer.issue(&claims)?;

        Ok(AuthOutcome::success(
            AuthStage::TokenRefresh,
            method,
            SubjectId::new(claims.sub),
        )
        .with_credential(token)
        .with_metadata("refreshed", true)
        .with_metadata("original_iat", original_iat)
        .with_metadata("expires_at", claims.exp))
    }

    async fn alternative(&self, request: &ConnectionRequest) -> Result<AuthOutcome, String> {
        let Some(store) = &self.sessions else {
            return Err("no session store configured".to_string());
        };

        if let Some(cookie) = request.session_cookie.as_deref() {
            if let Some(subject) = store.find_by_cookie(cookie).await {
                let matches_hint = request
                    .subject_hint
                    .as_ref()
                    .map_or(true, |hint| *hint == subject);
                if matches_hint {
                    return Ok(AuthOutcome::success(
                        AuthStage::AlternativeAuth,
                        AuthMethod::Session,
                        subject,
                    )
                    .with_metadata("via", "cookie"));
                }
                return Err(format!("session cookie belongs to {subject}"));
            }
        }

        if let Some(hint) = &request.subject_hint {
            if store.find_active(hint).await {
                return Ok(AuthOutcome::success(
                    AuthStage::AlternativeAuth,
                    AuthMethod::Session,
                    hint.clone(),
                )
                .with_metadata("via", "active_session"));
            }
        }

        Err("no active session".to_string())
    }

    fn guest(&self) -> Result<AuthOutcome, TokenError> {
        let subject = SubjectId::guest();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            exp: now + self.config.guest_lifetime_secs as i64,
            iat: now,
            auth_type: Some(GUEST_AUTH_TYPE.to_string()),
            permissions: self.config.guest_permissions.clone(),
            ..Claims::default()
        };
        let token = self.issuer.issue(&claims)?;

        info!(subject = %subject, "Issued guest credential");
        Ok(
            AuthOutcome::fallback_used(AuthStage::GuestMode, AuthMethod::Guest, subject)
                .with_credential(token)
                .with_metadata("permissions", self.config.guest_permissions.clone())
                .with_metadata("expires_at", claims.exp),
        )
    }
}

#[cfg(test)]
mod tests;
