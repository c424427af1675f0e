//! Composition root: wires configuration into a running gateway.
//!
//! Every collaborator is constructed here and passed down explicitly;
//! nothing in the application layer reaches for a global.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::inbound::ws::WsServer;
use crate::adapter::outbound::{
    InMemorySessionStore, JwtAuthenticator, SysinfoProbe, SystemLimitsProbe,
};
use crate::application::auth::AuthFallbackChain;
use crate::application::manager::ConnectionManager;
use crate::application::monitor::ResourceMonitor;
use crate::application::pool::ConnectionPool;
use crate::application::status::StatusWriter;
use crate::application::tuner::SystemTuner;
use crate::error::Result;
use crate::infrastructure::config::Config;
use crate::port::ResourceProbe;

/// Build the resource monitor over the host's sysinfo probe.
pub(crate) fn build_monitor(config: &Config) -> Arc<ResourceMonitor> {
    let probe: Arc<dyn ResourceProbe> = Arc::new(SysinfoProbe::new());
    Arc::new(ResourceMonitor::from_config(probe, &config.pool))
}

/// Build the fallback chain with JWT validation and in-memory sessions.
pub(crate) fn build_auth(config: &Config) -> Result<Arc<AuthFallbackChain>> {
    config.require_secret()?;
    let jwt = Arc::new(JwtAuthenticator::from_config(&config.auth)?);
    let sessions = Arc::new(InMemorySessionStore::new());
    let chain = AuthFallbackChain::new(
        jwt.clone(),
        jwt,
        config.auth.clone(),
        config.retry.clone(),
    )
    .with_session_store(sessions);
    Ok(Arc::new(chain))
}

/// Build the connection manager over a fresh pool and fallback chain.
pub fn build_manager(config: &Config) -> Result<Arc<ConnectionManager>> {
    let pool = Arc::new(ConnectionPool::new(config.pool.clone(), build_monitor(config))?);
    let auth = build_auth(config)?;
    Ok(Arc::new(ConnectionManager::new(
        pool,
        auth,
        config.server.clone(),
    )))
}

/// Tuner reading limits from the running host.
#[must_use]
pub fn build_tuner() -> SystemTuner {
    SystemTuner::new(Arc::new(SystemLimitsProbe::new()))
}

/// A bound, not yet running gateway.
pub struct Gateway {
    manager: Arc<ConnectionManager>,
    server: WsServer,
    status: Option<Arc<StatusWriter>>,
}

impl Gateway {
    /// Wire every component from `config` and bind the listener.
    pub async fn bind(config: &Config) -> Result<Self> {
        let manager = build_manager(config)?;
        let server = WsServer::bind(Arc::clone(&manager)).await?;
        let status = config
            .server
            .status_file
            .as_ref()
            .map(|path| Arc::new(StatusWriter::new(path, config.server.bind_address.clone())));

        let report = build_tuner().run(&config.pool, &config.server);
        if !report.is_ok() {
            warn!(
                worst = %report.worst(),
                findings = report.findings.len(),
                "System limits may not support the configured capacity; run `wsgate tune`"
            );
        }

        Ok(Self {
            manager,
            server,
            status,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Serve until `shutdown` is cancelled, then close every connection.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Self {
            manager,
            server,
            status,
        } = self;

        manager.start();

        let status_cancel = CancellationToken::new();
        let status_task = status.map(|writer| {
            info!(path = %writer.path().display(), "Writing status file");
            writer.spawn(
                Arc::clone(manager.pool()),
                manager.config().status_interval(),
                status_cancel.clone(),
            )
        });

        let served = server.run(shutdown).await;

        let closed = manager.shutdown().await;
        info!(closed, "Gateway shut down");

        status_cancel.cancel();
        if let Some(task) = status_task {
            let _ = task.await;
        }
        served
    }
}
