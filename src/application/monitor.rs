//! System resource monitor.
//!
//! Samples memory and CPU utilization through a [`ResourceProbe`], caches
//! the classification for a short TTL, and keeps a time-bounded ring of
//! samples for statistics.
//!
//! The cached status is published through an [`ArcSwapOption`], so admission
//! checks read it without locking. Only the refresh path takes an async
//! lock, which collapses concurrent refreshes inside one TTL window into a
//! single probe call. Reads run on the blocking pool.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::{
    ConnectionLoad, ResourceReading, ResourceSample, ResourceStatus, ResourceThresholds,
};
use crate::error::ProbeError;
use crate::infrastructure::config::PoolConfig;
use crate::port::ResourceProbe;

/// Hard cap on retained samples, independent of the retention window.
const MAX_SAMPLES: usize = 4096;

/// Classification cached between probe calls.
#[derive(Debug)]
struct CachedStatus {
    status: ResourceStatus,
    taken_at: Instant,
}

/// Sample plus the monotonic instant it was taken at, for eviction.
#[derive(Debug)]
struct TimedSample {
    taken_at: Instant,
    sample: ResourceSample,
}

/// Caching, classifying front end to a [`ResourceProbe`].
pub struct ResourceMonitor {
    probe: Arc<dyn ResourceProbe>,
    thresholds: ResourceThresholds,
    cache_ttl: Duration,
    retention: Duration,
    cached: ArcSwapOption<CachedStatus>,
    refresh: tokio::sync::Mutex<()>,
    samples: Mutex<VecDeque<TimedSample>>,
}

impl ResourceMonitor {
    pub fn new(
        probe: Arc<dyn ResourceProbe>,
        thresholds: ResourceThresholds,
        cache_ttl: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            probe,
            thresholds,
            cache_ttl,
            retention,
            cached: ArcSwapOption::empty(),
            refresh: tokio::sync::Mutex::new(()),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Build a monitor from the pool's thresholds, cache TTL and retention.
    pub fn from_config(probe: Arc<dyn ResourceProbe>, config: &PoolConfig) -> Self {
        Self::new(
            probe,
            config.thresholds(),
            config.resource_cache_ttl(),
            config.metrics_retention(),
        )
    }

    /// Current load classification.
    ///
    /// Returns the cached status while it is younger than the cache TTL.
    /// Otherwise takes one fresh reading, records a sample tagged with
    /// `load`, and publishes the new status. A probe failure yields
    /// [`ResourceStatus::Warning`] and is logged, never returned.
    pub async fn sample(&self, load: ConnectionLoad) -> ResourceStatus {
        if let Some(status) = self.fresh_cached() {
            return status;
        }

        let _refresh = self.refresh.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(status) = self.fresh_cached() {
            return status;
        }

        let now = Instant::now();
        let status = match self.read_resources().await {
            Ok(reading) => {
                let status = self.thresholds.classify(reading);
                debug!(
                    memory_percent = reading.memory_percent,
                    cpu_percent = reading.cpu_percent,
                    status = %status,
                    "Resource sample taken"
                );
                self.record(
                    now,
                    ResourceSample {
                        timestamp: Utc::now(),
                        memory_percent: reading.memory_percent,
                        cpu_percent: reading.cpu_percent,
                        active_connections: load.active,
                        pending_connections: load.pending,
                        status,
                    },
                );
                status
            }
            Err(e) => {
                warn!(error = %e, "Resource probe failed, assuming warning");
                ResourceStatus::Warning
            }
        };

        self.cached.store(Some(Arc::new(CachedStatus {
            status,
            taken_at: now,
        })));
        status
    }

    /// Last published status without probing, if any.
    #[must_use]
    pub fn cached_status(&self) -> Option<ResourceStatus> {
        self.cached.load().as_ref().map(|c| c.status)
    }

    /// Most recent retained sample.
    #[must_use]
    pub fn latest(&self) -> Option<ResourceSample> {
        self.samples.lock().back().map(|s| s.sample.clone())
    }

    /// All retained samples, oldest first.
    #[must_use]
    pub fn samples(&self) -> Vec<ResourceSample> {
        self.samples
            .lock()
            .iter()
            .map(|s| s.sample.clone())
            .collect()
    }

    /// Evict samples older than the retention window. Returns how many
    /// were dropped.
    pub fn trim(&self) -> usize {
        let now = Instant::now();
        let mut samples = self.samples.lock();
        Self::evict_expired(&mut samples, now, self.retention)
    }

    #[must_use]
    pub const fn thresholds(&self) -> ResourceThresholds {
        self.thresholds
    }

    async fn read_resources(&self) -> Result<ResourceReading, ProbeError> {
        let probe = Arc::clone(&self.probe);
        tokio::task::spawn_blocking(move || probe.read())
            .await
            .unwrap_or_else(|e| {
                Err(ProbeError::Unavailable(format!(
                    "resource read task failed: {e}"
                )))
            })
    }

    fn fresh_cached(&self) -> Option<ResourceStatus> {
        let cached = self.cached.load();
        cached
            .as_ref()
            .filter(|c| c.taken_at.elapsed() < self.cache_ttl)
            .map(|c| c.status)
    }

    fn record(&self, now: Instant, sample: ResourceSample) {
        let mut samples = self.samples.lock();
        samples.push_back(TimedSample {
            taken_at: now,
            sample,
        });
        Self::evict_expired(&mut samples, now, self.retention);
        while samples.len() > MAX_SAMPLES {
            samples.pop_front();
        }
    }

    fn evict_expired(
        samples: &mut VecDeque<TimedSample>,
        now: Instant,
        retention: Duration,
    ) -> usize {
        let mut evicted = 0;
        while let Some(front) = samples.front() {
            if now.duration_since(front.taken_at) <= retention {
                break;
            }
            samples.pop_front();
            evicted += 1;
        }
        evicted
    }
}
