//! Outbound adapters (driven side).

pub mod jwt;
pub mod limits;
pub mod session;
pub mod sysinfo;

pub use jwt::JwtAuthenticator;
pub use limits::SystemLimitsProbe;
pub use session::InMemorySessionStore;
pub use sysinfo::SysinfoProbe;
