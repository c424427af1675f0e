//! WebSocket inbound adapter.

pub mod request;
pub mod server;

pub use request::parse_request;
pub use server::{WsHandshake, WsInbound, WsServer, WsTransport};
