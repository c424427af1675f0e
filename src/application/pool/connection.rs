//! Registered connection record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::domain::{AuthMethod, ConnectionId, SubjectId};
use crate::port::SharedTransport;

/// An authenticated connection handed to the pool for registration.
///
/// The pool owns the record once added. Its transport is closed exactly
/// once, by whoever removes it from the pool, and its cancellation token is
/// cancelled at the same moment so the handling task can exit.
pub struct Connection {
    id: ConnectionId,
    subject: SubjectId,
    source_address: String,
    auth_method: AuthMethod,
    transport: SharedTransport,
    released: CancellationToken,
    created_at: DateTime<Utc>,
    metadata: BTreeMap<String, String>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        subject: SubjectId,
        source_address: impl Into<String>,
        auth_method: AuthMethod,
        transport: SharedTransport,
    ) -> Self {
        let source_address = source_address.into();
        let mut metadata = BTreeMap::new();
        metadata.insert("source_address".to_string(), source_address.clone());
        Self {
            id,
            subject,
            source_address,
            auth_method,
            transport,
            released: CancellationToken::new(),
            created_at: Utc::now(),
            metadata,
        }
    }

    /// Use `token` as the release signal instead of a fresh one.
    #[must_use]
    pub fn with_release_token(mut self, token: CancellationToken) -> Self {
        self.released = token;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn id(&self) -> &ConnectionId {
        &self.id
    }

    #[must_use]
    pub const fn subject(&self) -> &SubjectId {
        &self.subject
    }

    #[must_use]
    pub fn source_address(&self) -> &str {
        &self.source_address
    }

    #[must_use]
    pub const fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    #[must_use]
    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// Cancelled when the pool lets go of this connection.
    #[must_use]
    pub fn released(&self) -> CancellationToken {
        self.released.clone()
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("source_address", &self.source_address)
            .field("auth_method", &self.auth_method)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
