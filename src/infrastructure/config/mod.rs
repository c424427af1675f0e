//! Infrastructure configuration modules.

pub mod auth;
pub mod logging;
pub mod pool;
pub mod server;
pub mod settings;

pub use auth::AuthConfig;
pub use logging::LoggingConfig;
pub use pool::{PoolConfig, RetryConfig};
pub use server::ServerConfig;
pub use settings::{Config, JWT_SECRET_ENV};
