//! Authentication outcomes and credential claims.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::connection::AuthMethod;
use super::id::SubjectId;

/// Status of one pass through the authentication fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Success,
    Failed,
    RetryNeeded,
    FallbackUsed,
    CriticalError,
}

impl AuthStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RetryNeeded => "retry_needed",
            Self::FallbackUsed => "fallback_used",
            Self::CriticalError => "critical_error",
        }
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of the fallback chain, in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStage {
    NormalValidation,
    TokenRefresh,
    AlternativeAuth,
    RetryBackoff,
    GuestMode,
}

impl AuthStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NormalValidation => "normal_validation",
            Self::TokenRefresh => "token_refresh",
            Self::AlternativeAuth => "alternative_auth",
            Self::RetryBackoff => "retry_backoff",
            Self::GuestMode => "guest_mode",
        }
    }
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one `authenticate` call.
///
/// Stages never raise: every failure is folded into an outcome carrying a
/// human-readable error and, for audit, per-stage metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthOutcome {
    pub status: AuthStatus,
    pub subject: Option<SubjectId>,
    /// Credential the client should use from now on (refreshed or guest).
    pub credential: Option<String>,
    /// Stage that produced this outcome.
    pub stage: Option<AuthStage>,
    pub method: AuthMethod,
    pub error: Option<String>,
    /// How long the caller should wait before retrying.
    #[serde(with = "duration_secs_opt")]
    pub retry_after: Option<Duration>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AuthOutcome {
    fn base(status: AuthStatus, stage: Option<AuthStage>, method: AuthMethod) -> Self {
        Self {
            status,
            subject: None,
            credential: None,
            stage,
            method,
            error: None,
            retry_after: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Authenticated by a stage that fully verified the subject.
    #[must_use]
    pub fn success(stage: AuthStage, method: AuthMethod, subject: SubjectId) -> Self {
        let mut outcome = Self::base(AuthStatus::Success, Some(stage), method);
        outcome.subject = Some(subject);
        outcome
    }

    /// Authenticated through a reduced-trust fallback.
    #[must_use]
    pub fn fallback_used(stage: AuthStage, method: AuthMethod, subject: SubjectId) -> Self {
        let mut outcome = Self::base(AuthStatus::FallbackUsed, Some(stage), method);
        outcome.subject = Some(subject);
        outcome
    }

    /// Terminal failure for this attempt.
    #[must_use]
    pub fn failed(stage: AuthStage, error: impl Into<String>) -> Self {
        let mut outcome = Self::base(AuthStatus::Failed, Some(stage), AuthMethod::FallbackFailed);
        outcome.error = Some(error.into());
        outcome
    }

    /// Transient failure; the caller should retry after `wait`.
    #[must_use]
    pub fn retry_needed(wait: Duration, attempt: u32) -> Self {
        let mut outcome = Self::base(
            AuthStatus::RetryNeeded,
            Some(AuthStage::RetryBackoff),
            AuthMethod::FallbackFailed,
        );
        outcome.retry_after = Some(wait);
        outcome.error = Some("authentication temporarily unavailable".to_string());
        outcome.metadata.insert("attempt".to_string(), attempt.into());
        outcome
    }

    /// Every stage was exhausted.
    #[must_use]
    pub fn critical(errors: &[String]) -> Self {
        let mut outcome = Self::base(AuthStatus::CriticalError, None, AuthMethod::FallbackFailed);
        outcome.error = Some(format!("all authentication methods failed: {}", errors.join("; ")));
        outcome
            .metadata
            .insert("errors".to_string(), serde_json::json!(errors));
        outcome
    }

    #[must_use]
    pub fn with_credential(mut self, credential: String) -> Self {
        self.credential = Some(credential);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Whether the subject may be registered as connected.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.status, AuthStatus::Success | AuthStatus::FallbackUsed)
    }

    /// Attempt counter recorded by the retry stage, if any.
    #[must_use]
    pub fn attempt(&self) -> Option<u32> {
        self.metadata
            .get("attempt")
            .and_then(serde_json::Value::as_u64)
            .and_then(|a| u32::try_from(a).ok())
    }
}

mod duration_secs_opt {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }
}

/// Claims carried by a signed credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: String,
    /// Expiry, seconds since the Unix epoch.
    #[serde(default)]
    pub exp: i64,
    /// Issue time, seconds since the Unix epoch.
    #[serde(default)]
    pub iat: i64,
    /// `"guest"` for guest credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Set on credentials issued by the refresh stage.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub refreshed: bool,
    /// Issue time of the credential a refreshed one replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_iat: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Claims {
    /// Whether the named claim is present and non-empty.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        match name {
            "sub" => !self.sub.is_empty(),
            "exp" => self.exp > 0,
            "iat" => self.iat > 0,
            "auth_type" => self.auth_type.is_some(),
            "permissions" => !self.permissions.is_empty(),
            other => self.extra.get(other).is_some_and(|v| !v.is_null()),
        }
    }

    /// Names from `required` that are missing.
    #[must_use]
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .map(String::as_str)
            .filter(|name| !self.has(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_fallback_count_as_authenticated() {
        let ok = AuthOutcome::success(AuthStage::NormalValidation, AuthMethod::Jwt, "a".into());
        let guest = AuthOutcome::fallback_used(AuthStage::GuestMode, AuthMethod::Guest, "g".into());
        let failed = AuthOutcome::failed(AuthStage::NormalValidation, "expired");

        assert!(ok.is_authenticated());
        assert!(guest.is_authenticated());
        assert!(!failed.is_authenticated());
    }

    #[test]
    fn retry_outcome_carries_attempt_and_wait() {
        let outcome = AuthOutcome::retry_needed(Duration::from_millis(1500), 2);
        assert_eq!(outcome.status, AuthStatus::RetryNeeded);
        assert_eq!(outcome.attempt(), Some(2));
        assert_eq!(outcome.retry_after, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn critical_outcome_aggregates_errors() {
        let errors = vec!["token expired".to_string(), "no session".to_string()];
        let outcome = AuthOutcome::critical(&errors);
        let message = outcome.error.unwrap();
        assert!(message.contains("token expired"));
        assert!(message.contains("no session"));
        assert_eq!(outcome.metadata["errors"], serde_json::json!(errors));
    }

    #[test]
    fn claims_report_missing_custom_claims() {
        let mut claims = Claims {
            sub: "alice".to_string(),
            exp: 10,
            ..Claims::default()
        };
        claims
            .extra
            .insert("tenant".to_string(), serde_json::json!("acme"));

        let required = vec!["sub".to_string(), "tenant".to_string(), "role".to_string()];
        assert_eq!(claims.missing(&required), vec!["role"]);
    }
}
