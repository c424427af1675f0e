//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports are the seams between the gateway core and the outside world:
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!   WebSocket ───▶│  ConnectionManager           │───▶ TokenValidator / TokenIssuer
//!   server        │   ├── AuthFallbackChain      │───▶ SessionStore
//!  (Handshake,    │   └── ConnectionPool         │
//!   Transport)    │         └── ResourceMonitor  │───▶ ResourceProbe
//!                 └──────────────────────────────┘
//!                         SystemTuner ─────────────▶ OsLimitsProbe
//! ```

pub mod outbound;

pub use outbound::limits::{OsLimits, OsLimitsProbe};
pub use outbound::probe::ResourceProbe;
pub use outbound::session::SessionStore;
pub use outbound::token::{TokenIssuer, TokenValidator};
pub use outbound::transport::{
    Accepted, Handshake, InboundFrame, InboundStream, SharedTransport, Transport,
};
