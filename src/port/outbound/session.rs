//! Server-side session lookup port.

use async_trait::async_trait;

use crate::domain::SubjectId;

/// Lookup of active server-side sessions.
///
/// Optional collaborator: when none is configured the alternative
/// authentication stage always reports "not found". Implementations swallow
/// their own backend failures and report them as "not found".
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Whether `subject` has an active session.
    async fn find_active(&self, subject: &SubjectId) -> bool;

    /// Subject owning the session identified by `cookie`, if any.
    async fn find_by_cookie(&self, cookie: &str) -> Option<SubjectId>;
}
