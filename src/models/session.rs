//! Session record model and identity helpers.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of session ids assigned before a hook supplies the real one.
pub const SYNTHETIC_SESSION_PREFIX: &str = "synthetic-";

/// Process identifier of a tracked session.
///
/// Real OS pids are positive. Placeholders, assigned while a session is
/// known only by its logical id, are negative and never collide with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(i64);

impl Pid {
    /// Wrap a real OS process id.
    #[must_use]
    pub fn real(pid: u32) -> Self {
        Self(i64::from(pid))
    }

    /// Raw signed value.
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }

    /// Whether this pid is a synthetic placeholder.
    #[must_use]
    pub fn is_placeholder(self) -> bool {
        self.0 < 0
    }

    /// The OS process id, or `None` for placeholders.
    #[must_use]
    pub fn os_pid(self) -> Option<u32> {
        u32::try_from(self.0).ok()
    }
}

impl Display for Pid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic source of placeholder pids (`-1`, `-2`, ...).
#[derive(Debug)]
pub struct PlaceholderPids {
    next: AtomicI64,
}

impl Default for PlaceholderPids {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderPids {
    /// Create a generator starting at `-1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(-1),
        }
    }

    /// Allocate the next placeholder pid.
    pub fn allocate(&self) -> Pid {
        Pid(self.next.fetch_sub(1, Ordering::Relaxed))
    }
}

/// Synthetic session id derived from a pid.
#[must_use]
pub fn synthetic_session_id(pid: Pid) -> String {
    format!("{SYNTHETIC_SESSION_PREFIX}{pid}")
}

/// Activity status of a session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting for user input.
    #[default]
    Idle,
    /// Processing a request.
    Running,
}

/// Instantaneous resource usage sampled from the process table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessMetrics {
    /// CPU usage percentage.
    pub cpu_usage: f64,
    /// Memory usage percentage.
    pub memory_usage: f64,
}

/// Partial update merged into a record by [`SessionStore::upsert`].
///
/// [`SessionStore::upsert`]: crate::store::SessionStore::upsert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    /// New status.
    pub status: Option<SessionStatus>,
    /// New resource usage.
    pub metrics: Option<ProcessMetrics>,
    /// Process start time.
    pub start_time: Option<DateTime<Utc>>,
    /// Resolved working directory.
    pub working_dir: Option<PathBuf>,
    /// Transcript being tailed for this session.
    pub transcript_path: Option<PathBuf>,
}

/// One tracked session, keyed by pid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SessionRecord {
    /// Process id (real or placeholder).
    pub pid: Pid,
    /// Logical session id; synthetic until correlated.
    pub session_id: String,
    /// Whether `session_id` was supplied by a hook.
    pub correlated: bool,
    /// Current activity status.
    pub status: SessionStatus,
    /// CPU usage percentage.
    pub cpu_usage: f64,
    /// Memory usage percentage.
    pub memory_usage: f64,
    /// When the process started.
    pub start_time: DateTime<Utc>,
    /// When the record was created.
    pub first_seen_at: DateTime<Utc>,
    /// Last status or identity change.
    pub last_active_time: DateTime<Utc>,
    /// Human-readable uptime.
    pub running_time: String,
    /// Current working directory, once resolved.
    pub working_dir: Option<PathBuf>,
    /// Transcript path, when a hook supplied one.
    pub transcript_path: Option<PathBuf>,
    /// Short label for display.
    pub display_name: String,
    /// Insertion order within the store.
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl SessionRecord {
    /// A fresh idle record with zeroed metrics.
    #[must_use]
    pub fn new(pid: Pid, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            pid,
            session_id: synthetic_session_id(pid),
            correlated: false,
            status: SessionStatus::Idle,
            cpu_usage: 0.0,
            memory_usage: 0.0,
            start_time: now,
            first_seen_at: now,
            last_active_time: now,
            running_time: String::new(),
            working_dir: None,
            transcript_path: None,
            display_name: String::new(),
            seq: 0,
        };
        record.refresh_derived(now);
        record
    }

    /// Recompute `display_name` and `running_time`.
    pub fn refresh_derived(&mut self, now: DateTime<Utc>) {
        self.display_name = display_name(self.pid, &self.session_id, self.correlated);
        let elapsed = (now - self.start_time).num_seconds().max(0);
        self.running_time = format_running_time(elapsed.unsigned_abs());
    }

    /// Merge the set fields of `patch` into this record.
    pub fn apply_patch(&mut self, patch: &SessionPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(metrics) = patch.metrics {
            self.cpu_usage = metrics.cpu_usage;
            self.memory_usage = metrics.memory_usage;
        }
        if let Some(start_time) = patch.start_time {
            self.start_time = start_time;
        }
        if let Some(ref dir) = patch.working_dir {
            self.working_dir = Some(dir.clone());
        }
        if let Some(ref path) = patch.transcript_path {
            self.transcript_path = Some(path.clone());
        }
    }
}

fn display_name(pid: Pid, session_id: &str, correlated: bool) -> String {
    if correlated {
        session_id.chars().take(8).collect()
    } else {
        format!("pid {pid}")
    }
}

/// Format an elapsed number of seconds as a compact uptime label.
#[must_use]
pub fn format_running_time(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
