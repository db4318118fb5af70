//! Canonical pid → session record map.
//!
//! Every mutating call applies atomically and publishes exactly one
//! [`StoreEvent`] carrying the full snapshot. Calls that find nothing to
//! mutate return without publishing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use crate::models::session::{
    synthetic_session_id, Pid, ProcessMetrics, SessionPatch, SessionRecord, SessionStatus,
};

use super::events::{Change, StoreEvent};

/// Buffered notifications per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Store shared between the coordinator, pollers and the IPC server.
pub type SharedStore = Arc<Mutex<SessionStore>>;

/// Aggregate counts over the current records.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    /// All records.
    pub total: usize,
    /// Records with status `Running`.
    pub running: usize,
    /// Records with status `Idle`.
    pub idle: usize,
    /// Records still under a placeholder pid.
    pub placeholders: usize,
    /// Records still carrying a synthetic session id.
    pub uncorrelated: usize,
}

/// Owner of every [`SessionRecord`].
#[derive(Debug)]
pub struct SessionStore {
    records: HashMap<Pid, SessionRecord>,
    next_seq: u64,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            records: HashMap::new(),
            next_seq: 0,
            events,
        }
    }

    /// Wrap a new store for sharing across tasks.
    #[must_use]
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Subscribe to snapshot-changed notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Create or merge the record for `pid`.
    ///
    /// New records start `Idle` with zeroed metrics. Returns `true` when a
    /// record was created.
    pub fn upsert(&mut self, pid: Pid, patch: &SessionPatch) -> bool {
        let now = Utc::now();
        let created = !self.records.contains_key(&pid);
        if created {
            let mut record = SessionRecord::new(pid, now);
            record.seq = self.next_seq;
            self.next_seq += 1;
            self.records.insert(pid, record);
        }

        if let Some(record) = self.records.get_mut(&pid) {
            record.apply_patch(patch);
            record.last_active_time = now;
            record.refresh_derived(now);
        }

        self.emit(Change::Upserted { pid });
        created
    }

    /// Set the status of the record bound to `session_id`.
    ///
    /// Returns the affected pid, or `None` if no record carries the id.
    pub fn update_status_by_session_id(
        &mut self,
        session_id: &str,
        status: SessionStatus,
    ) -> Option<Pid> {
        let now = Utc::now();
        let record = self
            .records
            .values_mut()
            .find(|record| record.session_id == session_id)?;
        record.status = status;
        record.last_active_time = now;
        let pid = record.pid;

        self.emit(Change::StatusChanged { pid, status });
        Some(pid)
    }

    /// Bind a real session id to the record for `pid`.
    ///
    /// Keeps at most one record per session id. Another placeholder record
    /// holding the same id is folded into this one: its status and
    /// transcript carry over and it disappears without a `Removed` change,
    /// since the session itself is still tracked. Another real record
    /// holding the id reverts to its synthetic id and to `Idle`. Returns
    /// `false` if `pid` is unknown.
    pub fn associate_session(&mut self, pid: Pid, session_id: &str) -> bool {
        if !self.records.contains_key(&pid) {
            return false;
        }

        let now = Utc::now();
        let duplicates: Vec<Pid> = self
            .records
            .values()
            .filter(|record| record.pid != pid && record.session_id == session_id)
            .map(|record| record.pid)
            .collect();

        let mut inherited: Option<SessionRecord> = None;
        for other in duplicates {
            if other.is_placeholder() {
                inherited = self.records.remove(&other);
            } else if let Some(record) = self.records.get_mut(&other) {
                record.session_id = synthetic_session_id(other);
                record.correlated = false;
                record.status = SessionStatus::Idle;
                record.transcript_path = None;
                record.refresh_derived(now);
            }
        }

        if let Some(record) = self.records.get_mut(&pid) {
            record.session_id = session_id.to_owned();
            record.correlated = true;
            if let Some(folded) = inherited {
                record.status = folded.status;
                if record.transcript_path.is_none() {
                    record.transcript_path = folded.transcript_path;
                }
            }
            record.last_active_time = now;
            record.refresh_derived(now);
        }

        self.emit(Change::Associated {
            pid,
            session_id: session_id.to_owned(),
        });
        true
    }

    /// Move a record from `from` onto `to`.
    ///
    /// Used when a placeholder learns its real pid. Returns `false` if `from`
    /// is unknown or `to` is already tracked.
    pub fn rebind_pid(&mut self, from: Pid, to: Pid) -> bool {
        if self.records.contains_key(&to) {
            return false;
        }
        let Some(mut record) = self.records.remove(&from) else {
            return false;
        };

        let now = Utc::now();
        record.pid = to;
        if !record.correlated {
            record.session_id = synthetic_session_id(to);
        }
        record.refresh_derived(now);
        self.records.insert(to, record);

        self.emit(Change::Rebound { from, to });
        true
    }

    /// Refresh resource usage and process start time for `pid`.
    ///
    /// Does not count as activity. Returns `false` if `pid` is unknown.
    pub fn update_metrics(
        &mut self,
        pid: Pid,
        metrics: ProcessMetrics,
        start_time: DateTime<Utc>,
    ) -> bool {
        let Some(record) = self.records.get_mut(&pid) else {
            return false;
        };
        record.cpu_usage = metrics.cpu_usage;
        record.memory_usage = metrics.memory_usage;
        record.start_time = start_time;
        record.refresh_derived(Utc::now());

        self.emit(Change::MetricsUpdated { pid });
        true
    }

    /// Remove the record for `pid`, returning it.
    ///
    /// Unknown pids are a no-op and publish nothing.
    pub fn remove(&mut self, pid: Pid) -> Option<SessionRecord> {
        let record = self.records.remove(&pid)?;
        self.emit(Change::Removed {
            record: record.clone(),
        });
        Some(record)
    }

    /// Every record in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<SessionRecord> {
        let mut records: Vec<SessionRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|record| record.seq);
        records
    }

    /// Look up a record by pid.
    #[must_use]
    pub fn get_by_pid(&self, pid: Pid) -> Option<&SessionRecord> {
        self.records.get(&pid)
    }

    /// Look up a record by session id.
    #[must_use]
    pub fn get_by_session_id(&self, session_id: &str) -> Option<&SessionRecord> {
        self.records
            .values()
            .find(|record| record.session_id == session_id)
    }

    /// Counts over the current records.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            total: self.records.len(),
            ..StoreStats::default()
        };
        for record in self.records.values() {
            match record.status {
                SessionStatus::Running => stats.running += 1,
                SessionStatus::Idle => stats.idle += 1,
            }
            if record.pid.is_placeholder() {
                stats.placeholders += 1;
            }
            if !record.correlated {
                stats.uncorrelated += 1;
            }
        }
        stats
    }

    /// Number of tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Tracked real OS pids.
    #[must_use]
    pub fn real_pids(&self) -> Vec<u32> {
        self.records.keys().filter_map(|pid| pid.os_pid()).collect()
    }

    /// Earliest-inserted record still carrying a synthetic session id.
    #[must_use]
    pub fn first_uncorrelated(&self) -> Option<Pid> {
        self.records
            .values()
            .filter(|record| !record.correlated)
            .min_by_key(|record| record.seq)
            .map(|record| record.pid)
    }

    /// Earliest-inserted record still under a placeholder pid.
    #[must_use]
    pub fn oldest_placeholder(&self) -> Option<Pid> {
        self.records
            .values()
            .filter(|record| record.pid.is_placeholder())
            .min_by_key(|record| record.seq)
            .map(|record| record.pid)
    }

    /// Placeholder records with no activity for longer than `ttl`.
    #[must_use]
    pub fn stale_placeholders(&self, ttl: Duration, now: DateTime<Utc>) -> Vec<Pid> {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return Vec::new();
        };
        self.records
            .values()
            .filter(|record| record.pid.is_placeholder() && now - record.last_active_time > ttl)
            .map(|record| record.pid)
            .collect()
    }

    fn emit(&self, change: Change) {
        let event = StoreEvent {
            change,
            sessions: self.all(),
        };
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}
