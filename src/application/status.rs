//! Status file for external monitoring.
//!
//! A running gateway periodically writes its pool statistics as JSON so
//! that `wsgate status` and other tools can poll them without a network
//! endpoint.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::pool::{ConnectionPool, PoolStats};
use crate::error::Result;

/// Current status file format version.
const STATUS_VERSION: &str = "1";

/// Top-level status file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusFile {
    /// Schema version for forward compatibility.
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub pid: u32,
    pub bind_address: String,
    pub stats: PoolStats,
    /// When this file was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Writes [`StatusFile`] snapshots atomically.
pub struct StatusWriter {
    path: PathBuf,
    started_at: DateTime<Utc>,
    pid: u32,
    bind_address: String,
}

impl StatusWriter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, bind_address: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            started_at: Utc::now(),
            pid: std::process::id(),
            bind_address: bind_address.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `stats` to the file atomically.
    ///
    /// Uses write-to-temp-then-rename. Creates the parent directory if it
    /// doesn't exist.
    pub fn write(&self, stats: &PoolStats) -> Result<()> {
        let status = StatusFile {
            version: STATUS_VERSION.to_string(),
            started_at: self.started_at,
            pid: self.pid,
            bind_address: self.bind_address.clone(),
            stats: stats.clone(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&status)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;

        let cleanup_and_err = |e| {
            let _ = fs::remove_file(&temp_path);
            e
        };

        file.write_all(json.as_bytes()).map_err(cleanup_and_err)?;
        file.sync_all().map_err(cleanup_and_err)?;
        fs::rename(&temp_path, &self.path).map_err(cleanup_and_err)?;

        Ok(())
    }

    /// Read a status file written by a running gateway.
    pub fn read(path: impl AsRef<Path>) -> Result<StatusFile> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write `pool` statistics every `every` until `cancel` fires, then
    /// write one final snapshot.
    pub fn spawn(
        self: Arc<Self>,
        pool: Arc<ConnectionPool>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now(), every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if let Err(e) = self.write(&pool.stats()) {
                    warn!(path = %self.path.display(), error = %e, "Failed to write status file");
                }
            }

            if let Err(e) = self.write(&pool.stats()) {
                warn!(path = %self.path.display(), error = %e, "Failed to write final status");
            }
            debug!(path = %self.path.display(), "Status writer stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::config;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("status.json");
        let pool = config::healthy_pool(config::pool(5));

        let writer = StatusWriter::new(&path, "127.0.0.1:8765");
        writer.write(&pool.stats()).unwrap();

        let status = StatusWriter::read(&path).unwrap();
        assert_eq!(status.version, STATUS_VERSION);
        assert_eq!(status.pid, std::process::id());
        assert_eq!(status.bind_address, "127.0.0.1:8765");
        assert_eq!(status.stats.config.max_connections, 5);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StatusWriter::read(dir.path().join("absent.json")).is_err());
    }

    #[tokio::test]
    async fn spawned_writer_writes_final_snapshot_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let pool = config::healthy_pool(config::pool(5));
        let cancel = CancellationToken::new();

        let writer = Arc::new(StatusWriter::new(&path, "127.0.0.1:0"));
        let task = writer.spawn(Arc::clone(&pool), Duration::from_secs(60), cancel.clone());

        pool.shutdown().await;
        cancel.cancel();
        task.await.unwrap();

        let status = StatusWriter::read(&path).unwrap();
        assert!(status.stats.is_shutdown);
    }
}
