//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`transport`]: Mock [`Transport`](crate::port::Transport),
//!   [`InboundStream`](crate::port::InboundStream) and
//!   [`Handshake`](crate::port::Handshake) implementations.
//! - [`probe`]: Fixed and failing resource probes.
//! - [`token`]: Credentials signed with a fixed test secret.
//! - [`config`]: Canonical test configurations, monitors and pools.

pub mod config;
pub mod probe;
pub mod token;
pub mod transport;
