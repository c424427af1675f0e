//! Transport-agnostic domain types.

pub mod auth;
pub mod connection;
pub mod id;
pub mod message;
pub mod resource;

pub use auth::{AuthOutcome, AuthStage, AuthStatus, Claims};
pub use connection::{
    AuthMethod, ConnectionCounters, ConnectionInfo, ConnectionRequest, ConnectionState, Direction,
    InvalidTransition, Lifecycle,
};
pub use id::{ConnectionId, RequestId, SubjectId};
pub use message::{ClientMessage, CloseReason, ServerMessage};
pub use resource::{
    ConnectionLoad, ResourceReading, ResourceSample, ResourceStatus, ResourceThresholds,
};
