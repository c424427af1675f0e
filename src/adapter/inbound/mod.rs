//! Inbound adapters (driving side): the WebSocket server and the CLI.

pub mod cli;
pub mod ws;
