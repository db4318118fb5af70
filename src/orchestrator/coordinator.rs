//! Reconciliation coordinator.
//!
//! The coordinator is the only writer to the [`SessionStore`]. Every signal,
//! whatever its source, is applied here one at a time and to completion
//! while holding the store lock, so a scan and a hook touching the same pid
//! resolve as last-applied-wins.
//!
//! ## Identity binding
//!
//! A hook that names a session but not a pid is bound to the earliest
//! record still carrying a synthetic session id, or to a new placeholder
//! record when none exists. A placeholder is later moved onto a real pid
//! either by a hook that supplies the pid or by the next scan that finds an
//! untracked process. When two sessions start before either reports a pid,
//! which process each binds to is ambiguous: the first candidate found wins.
//! That ambiguity is inherent to the three signal sources and is not
//! resolved further here.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TailConfig;
use crate::models::hook::HookEvent;
use crate::models::session::{
    PlaceholderPids, Pid, ProcessMetrics, SessionPatch, SessionRecord, SessionStatus,
};
use crate::process::ScanReport;
use crate::store::{SessionStore, SharedStore};
use crate::tail::{InterruptDetected, LogTailer};

use super::signal::Signal;

/// Applies signals to the session store.
pub struct Coordinator {
    store: SharedStore,
    tailer: LogTailer,
    interrupts: mpsc::UnboundedReceiver<InterruptDetected>,
    placeholders: PlaceholderPids,
    placeholder_ttl: Duration,
}

impl Coordinator {
    /// Create a coordinator over `store`.
    ///
    /// Transcripts are only tailed when they live under `log_root`.
    #[must_use]
    pub fn new(
        store: SharedStore,
        log_root: PathBuf,
        tail: TailConfig,
        placeholder_ttl: Duration,
    ) -> Self {
        let (interrupt_tx, interrupts) = mpsc::unbounded_channel();
        Self {
            store,
            tailer: LogTailer::new(log_root, tail, interrupt_tx),
            interrupts,
            placeholders: PlaceholderPids::new(),
            placeholder_ttl,
        }
    }

    /// The store this coordinator writes to.
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Whether a transcript tail is active for `session_id`.
    #[must_use]
    pub fn is_tailing(&self, session_id: &str) -> bool {
        self.tailer.is_attached(session_id)
    }

    /// Apply signals until `cancel` fires.
    ///
    /// Hooks arrive on `hooks`, poller output on `signals`, and transcript
    /// interrupts on the coordinator's own tail channel.
    pub async fn run(
        mut self,
        mut hooks: mpsc::Receiver<HookEvent>,
        mut signals: mpsc::Receiver<Signal>,
        cancel: CancellationToken,
    ) {
        loop {
            let signal = tokio::select! {
                () = cancel.cancelled() => {
                    info!("coordinator shutting down");
                    break;
                }
                Some(event) = hooks.recv() => Signal::Hook(event),
                Some(signal) = signals.recv() => signal,
                Some(interrupt) = self.interrupts.recv() => Signal::Interrupt {
                    session_id: interrupt.session_id,
                },
                else => {
                    info!("all signal sources closed");
                    break;
                }
            };
            self.apply(signal).await;
        }

        self.tailer.detach_all();
    }

    /// Apply one signal to completion.
    pub async fn apply(&mut self, signal: Signal) {
        debug!(kind = signal.kind(), "applying signal");
        match signal {
            Signal::Hook(event) => self.apply_hook(event).await,
            Signal::Interrupt { session_id } => self.apply_interrupt(&session_id).await,
            Signal::Scan(report) => self.apply_scan(&report).await,
            Signal::Liveness { dead, checked_at } => {
                self.apply_liveness(&dead, checked_at).await;
            }
            Signal::WorkingDirs(dirs) => self.apply_working_dirs(dirs).await,
        }
    }

    async fn apply_hook(&mut self, event: HookEvent) {
        let store = Arc::clone(&self.store);
        let mut store = store.lock().await;

        let (pid, displaced) = self.correlate(&mut store, &event);
        if let Some(old_session) = displaced {
            self.tailer.detach(&old_session);
        }

        let mut patch = SessionPatch {
            status: Some(event.kind.target_status()),
            ..SessionPatch::default()
        };

        if let Some(ref path) = event.transcript_path {
            match self.tailer.attach(&event.session_id, path).await {
                Ok(backfill_interrupt) => {
                    if backfill_interrupt {
                        // Older than this hook, so the hook's status still wins.
                        info!(
                            session_id = %event.session_id,
                            "interrupt found in transcript backfill"
                        );
                        store.update_status_by_session_id(&event.session_id, SessionStatus::Idle);
                    }
                    patch.transcript_path = Some(path.clone());
                }
                Err(err) => {
                    warn!(%err, session_id = %event.session_id, "transcript tail refused");
                }
            }
        }

        store.upsert(pid, &patch);
        info!(
            session_id = %event.session_id,
            %pid,
            kind = ?event.kind,
            "hook applied"
        );
    }

    /// Find or create the record for a hook's session.
    ///
    /// Returns the bound pid and, when the pid previously belonged to a
    /// different correlated session, that session's id.
    fn correlate(&self, store: &mut SessionStore, event: &HookEvent) -> (Pid, Option<String>) {
        let session_id = event.session_id.as_str();

        if let Some(os_pid) = event.pid {
            let pid = Pid::real(os_pid);
            if store.get_by_pid(pid).is_none() {
                let placeholder = store
                    .get_by_session_id(session_id)
                    .map(|record| record.pid)
                    .filter(|candidate| candidate.is_placeholder());
                match placeholder {
                    Some(from) => {
                        store.rebind_pid(from, pid);
                        debug!(session_id, %from, to = %pid, "placeholder bound to hook pid");
                    }
                    None => {
                        store.upsert(pid, &SessionPatch::default());
                    }
                }
            }

            let displaced = match store.get_by_pid(pid) {
                Some(record) if record.correlated && record.session_id == session_id => {
                    return (pid, None);
                }
                Some(record) if record.correlated => Some(record.session_id.clone()),
                _ => None,
            };
            store.associate_session(pid, session_id);
            return (pid, displaced);
        }

        if let Some(record) = store.get_by_session_id(session_id) {
            return (record.pid, None);
        }

        if let Some(pid) = store.first_uncorrelated() {
            store.associate_session(pid, session_id);
            debug!(session_id, %pid, "session bound to uncorrelated process");
            return (pid, None);
        }

        let pid = self.placeholders.allocate();
        store.upsert(pid, &SessionPatch::default());
        store.associate_session(pid, session_id);
        debug!(session_id, %pid, "session tracked under placeholder pid");
        (pid, None)
    }

    async fn apply_interrupt(&mut self, session_id: &str) {
        let mut store = self.store.lock().await;
        match store.update_status_by_session_id(session_id, SessionStatus::Idle) {
            Some(pid) => info!(session_id, %pid, "session demoted to idle by interrupt"),
            None => debug!(session_id, "interrupt for untracked session"),
        }
    }

    async fn apply_scan(&mut self, report: &ScanReport) {
        let store = Arc::clone(&self.store);
        let mut store = store.lock().await;
        let mut seen = HashSet::with_capacity(report.samples.len());

        for sample in &report.samples {
            seen.insert(sample.pid);
            let pid = Pid::real(sample.pid);
            let metrics = ProcessMetrics {
                cpu_usage: sample.cpu_percent,
                memory_usage: sample.mem_percent,
            };

            if store.get_by_pid(pid).is_some() {
                store.update_metrics(pid, metrics, sample.start_time);
                continue;
            }

            let patch = SessionPatch {
                metrics: Some(metrics),
                start_time: Some(sample.start_time),
                ..SessionPatch::default()
            };
            if let Some(placeholder) = store.oldest_placeholder() {
                if store.rebind_pid(placeholder, pid) {
                    debug!(from = %placeholder, to = %pid, "placeholder bound to scanned pid");
                }
            }
            if store.upsert(pid, &patch) {
                debug!(%pid, "new process discovered");
            }
        }

        let gone: Vec<u32> = store
            .real_pids()
            .into_iter()
            .filter(|pid| !seen.contains(pid))
            .collect();
        for os_pid in gone {
            if let Some(record) = store.remove(Pid::real(os_pid)) {
                info!(pid = os_pid, session_id = %record.session_id, "process absent from scan");
                self.release(&record);
            }
        }
    }

    async fn apply_liveness(&mut self, dead: &[u32], checked_at: DateTime<Utc>) {
        let store = Arc::clone(&self.store);
        let mut store = store.lock().await;

        for &os_pid in dead {
            if let Some(record) = store.remove(Pid::real(os_pid)) {
                info!(pid = os_pid, session_id = %record.session_id, "liveness probe failed");
                self.release(&record);
            }
        }

        for pid in store.stale_placeholders(self.placeholder_ttl, checked_at) {
            if let Some(record) = store.remove(pid) {
                info!(%pid, session_id = %record.session_id, "stale placeholder dropped");
                self.release(&record);
            }
        }
    }

    async fn apply_working_dirs(&mut self, dirs: Vec<(u32, PathBuf)>) {
        let mut store = self.store.lock().await;
        for (os_pid, dir) in dirs {
            let pid = Pid::real(os_pid);
            let changed = match store.get_by_pid(pid) {
                Some(record) => record.working_dir.as_ref() != Some(&dir),
                // Removed since the lookup started.
                None => false,
            };
            if changed {
                store.upsert(
                    pid,
                    &SessionPatch {
                        working_dir: Some(dir),
                        ..SessionPatch::default()
                    },
                );
            }
        }
    }

    fn release(&mut self, record: &SessionRecord) {
        if record.correlated {
            self.tailer.detach(&record.session_id);
        }
    }
}
