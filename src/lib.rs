//! wsgate - WebSocket connection gateway.
//!
//! Admits, authenticates, pools and supervises long-lived WebSocket
//! connections, and fans server messages out to them.
//!
//! # Architecture
//!
//! - [`domain`] - Identifiers, lifecycle, auth outcomes, wire messages
//! - [`port`] - Traits at the edges: transports, token validation,
//!   session lookup, resource and OS limit probes
//! - [`application`] - `ResourceMonitor`, `ConnectionPool`,
//!   `AuthFallbackChain`, `ConnectionManager`, `SystemTuner`
//! - [`adapter`] - tokio-tungstenite server, CLI, JWT, sysinfo, procfs
//! - [`infrastructure`] - Configuration, logging and wiring
//!
//! # Example
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use wsgate::infrastructure::bootstrap::Gateway;
//! use wsgate::infrastructure::config::Config;
//!
//! # async fn run() -> wsgate::error::Result<()> {
//! let config = Config::load("config.toml")?;
//! let gateway = Gateway::bind(&config).await?;
//! gateway.run(CancellationToken::new()).await
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
