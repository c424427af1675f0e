//! Connection pool internal state types.
//!
//! Everything in [`PoolState`] is guarded by the pool's single mutex; the
//! [`SharedCounters`] are atomics that may be bumped without it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::time::Instant;

use super::connection::Connection;
use crate::domain::{
    ConnectionCounters, ConnectionId, ConnectionInfo, ConnectionState, Direction, SubjectId,
};

/// Lifetime counters that do not need the index lock.
pub(super) struct SharedCounters {
    pub(super) created: AtomicU64,
    pub(super) closed: AtomicU64,
    pub(super) rejected: AtomicU64,
    pub(super) failed: AtomicU64,
    pub(super) pending: AtomicUsize,
}

impl SharedCounters {
    pub(super) fn new() -> Self {
        Self {
            created: AtomicU64::new(0),
            closed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
        }
    }

    pub(super) fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

/// A registered connection plus the bookkeeping the pool keeps for it.
pub(super) struct PooledConnection {
    pub(super) connection: Connection,
    pub(super) state: ConnectionState,
    pub(super) registered_at: Instant,
    pub(super) last_activity: Instant,
    pub(super) counters: ConnectionCounters,
    pub(super) channels: BTreeSet<String>,
}

impl PooledConnection {
    pub(super) fn new(connection: Connection, now: Instant) -> Self {
        Self {
            connection,
            state: ConnectionState::Connected,
            registered_at: now,
            last_activity: now,
            counters: ConnectionCounters::default(),
            channels: BTreeSet::new(),
        }
    }

    /// Record activity. `last_activity` never moves backwards.
    pub(super) fn touch(&mut self, now: Instant, direction: Direction, bytes: u64, messages: u64) {
        if now > self.last_activity {
            self.last_activity = now;
        }
        self.counters.record(direction, bytes, messages);
    }

    pub(super) fn info(&self, now: Instant) -> ConnectionInfo {
        let conn = &self.connection;
        ConnectionInfo {
            id: conn.id().clone(),
            subject: conn.subject().clone(),
            source_address: conn.source_address().to_string(),
            state: self.state,
            auth_method: conn.auth_method(),
            created_at: conn.created_at(),
            idle_secs: now.duration_since(self.last_activity).as_secs_f64(),
            counters: self.counters,
            channels: self.channels.iter().cloned().collect(),
            metadata: conn.metadata().clone(),
        }
    }
}

/// Connection map and its secondary indexes.
#[derive(Default)]
pub(super) struct PoolState {
    pub(super) connections: HashMap<ConnectionId, PooledConnection>,
    pub(super) by_subject: HashMap<SubjectId, HashSet<ConnectionId>>,
    pub(super) by_source: HashMap<String, HashSet<ConnectionId>>,
    pub(super) by_channel: HashMap<String, HashSet<ConnectionId>>,
    pub(super) peak: usize,
    pub(super) session_secs_total: f64,
    pub(super) sessions_ended: u64,
    pub(super) shut_down: bool,
}

impl PoolState {
    pub(super) fn subject_count(&self, subject: &SubjectId) -> usize {
        self.by_subject.get(subject).map_or(0, HashSet::len)
    }

    pub(super) fn source_count(&self, source: &str) -> usize {
        self.by_source.get(source).map_or(0, HashSet::len)
    }

    /// Insert into the main map and every index.
    pub(super) fn insert(&mut self, entry: PooledConnection) {
        let id = entry.connection.id().clone();
        self.by_subject
            .entry(entry.connection.subject().clone())
            .or_default()
            .insert(id.clone());
        self.by_source
            .entry(entry.connection.source_address().to_string())
            .or_default()
            .insert(id.clone());
        self.connections.insert(id, entry);
        self.peak = self.peak.max(self.connections.len());
    }

    /// Remove from the main map and every index, folding the session
    /// duration into the running average.
    pub(super) fn take(&mut self, id: &ConnectionId, now: Instant) -> Option<PooledConnection> {
        let mut entry = self.connections.remove(id)?;

        unindex(&mut self.by_subject, entry.connection.subject(), id);
        unindex(
            &mut self.by_source,
            entry.connection.source_address(),
            id,
        );
        for channel in &entry.channels {
            unindex(&mut self.by_channel, channel.as_str(), id);
        }

        self.session_secs_total += now.duration_since(entry.registered_at).as_secs_f64();
        self.sessions_ended += 1;
        entry.state = ConnectionState::Disconnecting;
        Some(entry)
    }

    pub(super) fn subscribe(&mut self, id: &ConnectionId, channel: &str) -> bool {
        let Some(entry) = self.connections.get_mut(id) else {
            return false;
        };
        entry.channels.insert(channel.to_string());
        self.by_channel
            .entry(channel.to_string())
            .or_default()
            .insert(id.clone());
        true
    }

    pub(super) fn unsubscribe(&mut self, id: &ConnectionId, channel: &str) -> bool {
        let Some(entry) = self.connections.get_mut(id) else {
            return false;
        };
        if !entry.channels.remove(channel) {
            return false;
        }
        unindex(&mut self.by_channel, channel, id);
        true
    }

    pub(super) fn average_session_secs(&self) -> f64 {
        if self.sessions_ended == 0 {
            return 0.0;
        }
        self.session_secs_total / self.sessions_ended as f64
    }
}

/// Remove `id` from the bucket at `key`, dropping the bucket when empty.
fn unindex<K, Q>(index: &mut HashMap<K, HashSet<ConnectionId>>, key: &Q, id: &ConnectionId)
where
    K: Eq + Hash + std::borrow::Borrow<Q>,
    Q: Eq + Hash + ?Sized,
{
    if let Some(bucket) = index.get_mut(key) {
        bucket.remove(id);
        if bucket.is_empty() {
            index.remove(key);
        }
    }
}
