//! In-memory session store.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::domain::SubjectId;
use crate::port::SessionStore;

#[derive(Debug, Clone)]
struct Session {
    subject: SubjectId,
    expires_at: Instant,
}

/// Process-local sessions keyed by cookie value.
///
/// Expired sessions are ignored on lookup and dropped by [`purge`](Self::purge).
#[derive(Default)]
pub struct InMemorySessionStore {
    by_cookie: DashMap<String, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session for `subject` under `cookie`, valid for `ttl`.
    pub fn insert(&self, cookie: impl Into<String>, subject: SubjectId, ttl: Duration) {
        self.by_cookie.insert(
            cookie.into(),
            Session {
                subject,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn revoke(&self, cookie: &str) -> bool {
        self.by_cookie.remove(cookie).is_some()
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let now = Instant::now();
        let before = self.by_cookie.len();
        self.by_cookie.retain(|_, s| s.expires_at > now);
        before.saturating_sub(self.by_cookie.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_cookie.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_cookie.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find_active(&self, subject: &SubjectId) -> bool {
        let now = Instant::now();
        self.by_cookie
            .iter()
            .any(|s| s.subject == *subject && s.expires_at > now)
    }

    async fn find_by_cookie(&self, cookie: &str) -> Option<SubjectId> {
        let now = Instant::now();
        self.by_cookie
            .get(cookie)
            .filter(|s| s.expires_at > now)
            .map(|s| s.subject.clone())
    }
}
