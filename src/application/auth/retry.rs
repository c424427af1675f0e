//! Bounded retry tracking for the backoff stage.
//!
//! Attempts are keyed by request id. Entries are dropped explicitly on
//! success or give-up, and implicitly once untouched for `tracker_ttl_secs`
//! or when the map is full.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::RequestId;
use crate::infrastructure::config::RetryConfig;

/// What the backoff stage should do for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry immediately; `attempt` is the attempt just recorded.
    Proceed { attempt: u32 },
    /// Too early; wait `remaining` before calling again.
    Wait { remaining: Duration, attempt: u32 },
    /// `max_retries` attempts were already used.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy)]
struct RetryEntry {
    attempts: u32,
    last_attempt: Instant,
}

/// Per-request attempt counters with capped exponential spacing.
pub struct RetryTracker {
    config: RetryConfig,
    entries: DashMap<RequestId, RetryEntry>,
}

impl RetryTracker {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    /// Decide whether `request_id` may retry now.
    ///
    /// The n-th retry must come at least `delay_for(n - 1)` after the
    /// previous one; a call that is too early does not consume an attempt.
    pub fn check(&self, request_id: &RequestId) -> RetryDecision {
        let now = Instant::now();
        if !self.entries.contains_key(request_id) {
            self.make_room();
        }

        let mut entry = self
            .entries
            .entry(request_id.clone())
            .or_insert(RetryEntry {
                attempts: 0,
                last_attempt: now,
            });

        if entry.attempts >= self.config.max_retries {
            return RetryDecision::Exhausted {
                attempts: entry.attempts,
            };
        }

        if entry.attempts > 0 {
            let delay = self.config.delay_for(entry.attempts - 1);
            let elapsed = now.duration_since(entry.last_attempt);
            if elapsed < delay {
                return RetryDecision::Wait {
                    remaining: delay - elapsed,
                    attempt: entry.attempts,
                };
            }
        }

        entry.attempts += 1;
        entry.last_attempt = now;
        RetryDecision::Proceed {
            attempt: entry.attempts,
        }
    }

    /// Forget `request_id`. Returns whether it was tracked.
    pub fn reset(&self, request_id: &RequestId) -> bool {
        self.entries.remove(request_id).is_some()
    }

    #[must_use]
    pub fn attempts(&self, request_id: &RequestId) -> u32 {
        self.entries.get(request_id).map_or(0, |e| e.attempts)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries untouched for longer than the tracker TTL.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.tracker_ttl();
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.duration_since(e.last_attempt) <= ttl);
        before.saturating_sub(self.entries.len())
    }

    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Ensure there is space for one more entry: purge expired entries,
    /// then evict the oldest if still full.
    fn make_room(&self) {
        if self.entries.len() < self.config.tracker_capacity {
            return;
        }
        let purged = self.purge_expired();
        while self.entries.len() >= self.config.tracker_capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.last_attempt)
                .map(|e| e.key().clone());
            match oldest {
                Some(id) => {
                    self.entries.remove(&id);
                }
                None => break,
            }
        }
        debug!(
            purged,
            capacity = self.config.tracker_capacity,
            "Retry tracker was full"
        );
    }
}
