use thiserror::Error;

use crate::domain::message::CloseReason;
use crate::domain::InvalidTransition;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Reasons a connection is refused by admission control.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("server at capacity: {current} >= {max} connections")]
    Capacity { current: usize, max: usize },

    #[error("subject {subject} has too many connections: {current} >= {max}")]
    SubjectLimit {
        subject: String,
        current: usize,
        max: usize,
    },

    #[error("source {source_address} has too many connections: {current} >= {max}")]
    SourceLimit {
        source_address: String,
        current: usize,
        max: usize,
    },

    #[error("system overloaded and {current} connections >= soft limit {soft_limit}")]
    ResourceOverloaded { current: usize, soft_limit: usize },

    #[error("connection pool is shut down")]
    ShuttingDown,

    #[error("connection {0} is already registered")]
    DuplicateConnection(String),
}

impl AdmissionError {
    /// Close reason reported to the client for this rejection.
    #[must_use]
    pub const fn close_reason(&self) -> CloseReason {
        match self {
            Self::ShuttingDown => CloseReason::ServerShutdown,
            _ => CloseReason::CapacityExceeded,
        }
    }
}

/// Credential validation failures reported by a token validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("credential is empty")]
    Empty,

    #[error("malformed credential: {0}")]
    Malformed(String),

    #[error("credential has expired")]
    Expired,

    #[error("credential signature is invalid")]
    BadSignature,

    #[error("credential audience is not accepted")]
    WrongAudience,

    #[error("credential is missing required claims: {}", .0.join(", "))]
    MissingClaims(Vec<String>),

    #[error("credential subject {actual} does not match {expected}")]
    SubjectMismatch { expected: String, actual: String },

    #[error("credential rejected: {0}")]
    Rejected(String),

    #[error("failed to issue credential: {0}")]
    Issue(String),
}

/// Transport-level failures. They remove the affected connection, never crash.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Resource probe failures; degraded to a `Warning` status by the monitor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("resource probe unavailable: {0}")]
    Unavailable(String),
}

/// Per-connection failures surfaced by the connection manager.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("admission rejected: {0}")]
    AdmissionRejected(#[from] AdmissionError),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Lifecycle(#[from] InvalidTransition),

    #[error("connection cancelled by shutdown")]
    Cancelled,
}

impl ConnectError {
    /// Close reason reported to the client for this failure.
    #[must_use]
    pub const fn close_reason(&self) -> CloseReason {
        match self {
            Self::AdmissionRejected(err) => err.close_reason(),
            Self::AuthenticationFailed(_) => CloseReason::AuthenticationFailed,
            Self::Transport(_) | Self::Lifecycle(_) => CloseReason::SendFailure,
            Self::Cancelled => CloseReason::ServerShutdown,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(err))
    }
}
