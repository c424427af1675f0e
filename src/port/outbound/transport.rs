//! Transport port: the WebSocket seen from the gateway core.
//!
//! A [`Handshake`] is an upgrade request that has not been answered yet.
//! Accepting it yields a [`Transport`] (write side, shared with the pool for
//! fan-out) and an [`InboundStream`] (read side, owned by the connection's
//! handling task).

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{CloseReason, ConnectionRequest, ServerMessage};
use crate::error::TransportError;

/// Write side of an accepted connection.
///
/// `close` must be idempotent: the first call sends the close frame, later
/// calls are no-ops.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message; returns the number of bytes written.
    async fn send(&self, message: &ServerMessage) -> Result<usize, TransportError>;

    /// Close the connection with the given reason.
    async fn close(&self, reason: CloseReason);

    /// Whether `close` has been called or the peer went away.
    fn is_closed(&self) -> bool;
}

/// Transport handle shared between the pool and the connection task.
pub type SharedTransport = Arc<dyn Transport>;

/// One frame read from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    /// Binary payload; only its size is relevant to the gateway.
    Binary(usize),
    /// Transport-level ping or pong; counts as activity.
    Control(usize),
    /// Client sent a close frame.
    Close(Option<u16>),
}

/// Read side of an accepted connection.
#[async_trait]
pub trait InboundStream: Send {
    /// Next frame, or `None` once the stream has ended or failed.
    async fn next_frame(&mut self) -> Option<InboundFrame>;
}

/// Both halves of an accepted connection.
pub struct Accepted {
    pub transport: SharedTransport,
    pub inbound: Box<dyn InboundStream>,
}

/// A pending upgrade request.
#[async_trait]
pub trait Handshake: Send + Sized {
    /// Parameters extracted from the upgrade request.
    fn request(&self) -> &ConnectionRequest;

    /// Complete the upgrade.
    async fn accept(self) -> Result<Accepted, TransportError>;

    /// Refuse the upgrade with a distinct close code.
    async fn reject(self, reason: CloseReason);
}
