//! Periodic signal sources.
//!
//! Each poller runs on its own task, performs its I/O without touching the
//! store's write path, and forwards what it observed to the coordinator as a
//! [`Signal`]. A poller stops when its cancellation token fires or the
//! coordinator's channel closes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::IntervalConfig;
use crate::process::{LivenessProbe, ProcessScanner, WorkingDirResolver};
use crate::store::SharedStore;

use super::signal::Signal;

/// The collaborators driven by the periodic loops.
pub struct Pollers {
    /// Process-table scanner.
    pub scanner: ProcessScanner,
    /// Existence probe for tracked pids.
    pub probe: Arc<dyn LivenessProbe>,
    /// Cached working-directory lookups.
    pub resolver: Arc<WorkingDirResolver>,
}

impl Pollers {
    /// Spawn the scan, liveness and working-directory loops.
    ///
    /// The store is only read here; every change goes through `signals`.
    #[must_use]
    pub fn spawn(
        self,
        store: SharedStore,
        intervals: &IntervalConfig,
        signals: mpsc::Sender<Signal>,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        vec![
            spawn_scan_loop(
                self.scanner,
                intervals.scan(),
                signals.clone(),
                cancel.clone(),
            ),
            spawn_liveness_loop(
                Arc::clone(&store),
                self.probe,
                intervals.liveness(),
                signals.clone(),
                cancel.clone(),
            ),
            spawn_working_dir_loop(
                store,
                self.resolver,
                intervals.working_dir_initial_delay(),
                intervals.working_dir(),
                signals,
                cancel.clone(),
            ),
        ]
    }
}

/// Scan the process table every `interval`.
///
/// A failed scan is logged and skipped; it never reports an empty table.
#[must_use]
pub fn spawn_scan_loop(
    scanner: ProcessScanner,
    interval: Duration,
    signals: mpsc::Sender<Signal>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match scanner.scan().await {
                Ok(report) => {
                    debug!(matches = report.samples.len(), "process scan complete");
                    if signals.send(Signal::Scan(report)).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(%err, "process scan failed"),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
        info!("process scan loop shutting down");
    })
}

/// Probe every tracked real pid every `interval`.
///
/// Also runs when nothing failed so the coordinator can sweep stale
/// placeholder records on the same cadence.
#[must_use]
pub fn spawn_liveness_loop(
    store: SharedStore,
    probe: Arc<dyn LivenessProbe>,
    interval: Duration,
    signals: mpsc::Sender<Signal>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }

            let pids = store.lock().await.real_pids();
            let dead: Vec<u32> = pids
                .into_iter()
                .filter(|pid| !probe.is_alive(*pid))
                .collect();
            if !dead.is_empty() {
                debug!(?dead, "liveness probe failures");
            }

            let signal = Signal::Liveness {
                dead,
                checked_at: Utc::now(),
            };
            if signals.send(signal).await.is_err() {
                break;
            }
        }
        info!("liveness loop shutting down");
    })
}

/// Refresh working directories every `interval`, after `initial_delay`.
///
/// Only successful lookups are forwarded.
#[must_use]
pub fn spawn_working_dir_loop(
    store: SharedStore,
    resolver: Arc<WorkingDirResolver>,
    initial_delay: Duration,
    interval: Duration,
    signals: mpsc::Sender<Signal>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut wait = initial_delay;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            wait = interval;

            let pids = store.lock().await.real_pids();
            if pids.is_empty() {
                continue;
            }
            let dirs = resolver.resolve_many(&pids).await;
            if dirs.is_empty() {
                continue;
            }
            if signals.send(Signal::WorkingDirs(dirs)).await.is_err() {
                break;
            }
        }
        info!("working directory loop shutting down");
    })
}
