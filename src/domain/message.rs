//! Application-level messages exchanged over a WebSocket and close reasons.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ConnectionId, SubjectId};

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirmation sent once the connection is registered.
    ConnectionEstablished {
        connection_id: ConnectionId,
        user_id: SubjectId,
        timestamp: DateTime<Utc>,
        /// Replacement credential when refresh or guest mode issued one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Periodic liveness message.
    Heartbeat { timestamp: DateTime<Utc> },
    /// Progress of a long-running job owned by the subject.
    ExecutionUpdate {
        execution_id: String,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<serde_json::Value>,
        timestamp: DateTime<Utc>,
    },
    /// Payload published to a channel the client subscribed to.
    ChannelMessage {
        channel: String,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    Subscribed { channel: String },
    Unsubscribed { channel: String },
    Pong { timestamp: DateTime<Utc> },
    Error { code: String, message: String },
}

impl ServerMessage {
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn channel(channel: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::ChannelMessage {
            channel: channel.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wire name of this message kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::Heartbeat { .. } => "heartbeat",
            Self::ExecutionUpdate { .. } => "execution_update",
            Self::ChannelMessage { .. } => "channel_message",
            Self::Subscribed { .. } => "subscribed",
            Self::Unsubscribed { .. } => "unsubscribed",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }
}

/// Messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    Pong,
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

/// Why a connection was closed, mapped to a distinct WebSocket close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Client-initiated or orderly close.
    Normal,
    ServerShutdown,
    SendFailure,
    CapacityExceeded,
    AuthenticationFailed,
    IdleTimeout,
}

impl CloseReason {
    /// WebSocket close code sent to the client.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::ServerShutdown => 1001,
            Self::SendFailure => 1011,
            Self::CapacityExceeded => 1013,
            Self::AuthenticationFailed => 4001,
            Self::IdleTimeout => 4008,
        }
    }

    /// Close frame reason text.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Normal => "normal closure",
            Self::ServerShutdown => "server shutdown",
            Self::SendFailure => "send failure",
            Self::CapacityExceeded => "capacity exceeded",
            Self::AuthenticationFailed => "authentication failed",
            Self::IdleTimeout => "idle timeout",
        }
    }

    /// Inverse of [`CloseReason::code`].
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::ServerShutdown),
            1011 => Some(Self::SendFailure),
            1013 => Some(Self::CapacityExceeded),
            4001 => Some(Self::AuthenticationFailed),
            4008 => Some(Self::IdleTimeout),
            _ => None,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
