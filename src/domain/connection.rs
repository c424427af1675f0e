//! Connection lifecycle types.
//!
//! - [`ConnectionState`] - lifecycle state machine of a single session
//! - [`AuthMethod`] - how the owning subject was authenticated
//! - [`ConnectionCounters`] - per-connection traffic counters
//! - [`ConnectionInfo`] - transport-free snapshot handed out by the pool
//! - [`ConnectionRequest`] - parameters extracted from an upgrade request

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ConnectionId, RequestId, SubjectId};

/// Lifecycle state of a connection.
///
/// ```text
/// Pending -> Authenticating -> Connected -> Disconnecting -> Disconnected
///    |             |
///    +-------------+----------> Error
/// ```
///
/// `Disconnected` and `Error` are terminal. A connection that fails
/// admission never reaches `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Pending,
    Authenticating,
    Connected,
    Disconnecting,
    Disconnected,
    Error,
}

impl ConnectionState {
    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Authenticating)
                | (Self::Pending, Self::Error)
                | (Self::Authenticating, Self::Connected)
                | (Self::Authenticating, Self::Error)
                | (Self::Connected, Self::Disconnecting)
                | (Self::Disconnecting, Self::Disconnected)
        )
    }

    /// Terminal states accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }

    /// Stable lowercase name used in logs and statistics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a lifecycle transition is not allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid connection state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Tracks the state of a connection that is still owned by its handling task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    state: ConnectionState,
}

impl Lifecycle {
    /// Start a lifecycle in `Pending` (transport accepted, not authenticated).
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            state: ConnectionState::Pending,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn advance(&mut self, next: ConnectionState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// How the owning subject of a connection was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Signed credential, validated directly or after refresh.
    Jwt,
    /// Active server-side session or session cookie.
    Session,
    /// Reduced-privilege guest credential.
    Guest,
    /// Every fallback stage failed.
    FallbackFailed,
}

impl AuthMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jwt => "jwt",
            Self::Session => "session",
            Self::Guest => "guest",
            Self::FallbackFailed => "fallback_failed",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of traffic recorded by [`ConnectionCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

/// Per-connection traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCounters {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

impl ConnectionCounters {
    /// Fold a traffic delta into the counters.
    pub fn record(&mut self, direction: Direction, bytes: u64, messages: u64) {
        match direction {
            Direction::Sent => {
                self.bytes_sent = self.bytes_sent.saturating_add(bytes);
                self.messages_sent = self.messages_sent.saturating_add(messages);
            }
            Direction::Received => {
                self.bytes_received = self.bytes_received.saturating_add(bytes);
                self.messages_received = self.messages_received.saturating_add(messages);
            }
        }
    }
}

/// Snapshot of a pooled connection without its transport handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub subject: SubjectId,
    pub source_address: String,
    pub state: ConnectionState,
    pub auth_method: AuthMethod,
    pub created_at: DateTime<Utc>,
    /// Seconds since the last recorded activity.
    pub idle_secs: f64,
    pub counters: ConnectionCounters,
    pub channels: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Parameters of an inbound connection, extracted before the upgrade completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Bearer credential, possibly empty or expired.
    pub credential: Option<String>,
    /// Subject the client claims to be, used by refresh and session lookup.
    pub subject_hint: Option<SubjectId>,
    /// Client-supplied request id for retry tracking.
    pub request_id: Option<RequestId>,
    /// Session cookie value, if any.
    pub session_cookie: Option<String>,
    /// Remote address bucket (IP without port).
    pub source_address: String,
}

impl ConnectionRequest {
    pub fn new(source_address: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    #[must_use]
    pub fn with_subject_hint(mut self, subject: impl Into<SubjectId>) -> Self {
        self.subject_hint = Some(subject.into());
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<RequestId>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }
}
