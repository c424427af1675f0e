//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.
//! Avoids each test module defining its own slightly-different defaults.

use std::sync::Arc;
use std::time::Duration;

use crate::application::monitor::ResourceMonitor;
use crate::application::pool::ConnectionPool;
use crate::domain::ResourceThresholds;
use crate::infrastructure::config::{AuthConfig, Config, PoolConfig, RetryConfig, ServerConfig};
use crate::port::ResourceProbe;

use super::probe::FixedProbe;
use super::token::SECRET;

/// Pool config with the given total limit.
///
/// Per-subject and per-source limits are generous so that only the total
/// bites unless a test overrides them.
pub fn pool(max_connections: usize) -> PoolConfig {
    PoolConfig {
        max_connections,
        max_connections_per_subject: 10,
        max_connections_per_source: 50,
        idle_timeout_secs: 60,
        cleanup_interval_secs: 10,
        metrics_retention_secs: 300,
        ..PoolConfig::default()
    }
}

/// Fast retry policy: 100ms base, doubling, capped at 1s, three attempts.
pub fn retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        base_delay_ms: 100,
        max_delay_ms: 1000,
        exponential_base: 2.0,
        tracker_capacity: 100,
        tracker_ttl_secs: 60,
    }
}

/// Auth config signing with [`SECRET`], guest mode off.
pub fn auth() -> AuthConfig {
    AuthConfig {
        jwt_secret: SECRET.to_string(),
        ..AuthConfig::default()
    }
}

/// Server config bound to an ephemeral loopback port.
pub fn server() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        heartbeat_interval_secs: 30,
        auth_timeout_secs: 10,
        ..ServerConfig::default()
    }
}

/// Complete config with the given total limit.
pub fn config(max_connections: usize) -> Config {
    Config {
        server: server(),
        pool: pool(max_connections),
        retry: retry(),
        auth: auth(),
        ..Config::default()
    }
}

/// Monitor over `probe` with a 1s cache and default thresholds.
pub fn monitor(probe: Arc<dyn ResourceProbe>) -> Arc<ResourceMonitor> {
    Arc::new(ResourceMonitor::new(
        probe,
        ResourceThresholds::default(),
        Duration::from_secs(1),
        Duration::from_secs(300),
    ))
}

/// Monitor that always reports a healthy system.
pub fn healthy_monitor() -> Arc<ResourceMonitor> {
    monitor(Arc::new(FixedProbe::new(10.0, 10.0)))
}

/// Pool over a healthy monitor.
pub fn healthy_pool(config: PoolConfig) -> Arc<ConnectionPool> {
    Arc::new(
        ConnectionPool::new(config, healthy_monitor()).expect("testkit pool config is valid"),
    )
}
