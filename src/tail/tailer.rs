//! Per-session transcript tailing.
//!
//! Each attached session gets a `notify` watcher on the transcript's parent
//! directory and a background task that reads newly appended lines whenever
//! the file changes. Interrupts found in new lines are reported as
//! [`InterruptDetected`] on the tailer's channel. Dropping a session's handle
//! cancels its task and releases the watcher.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::TailConfig;
use crate::{AppError, Result};

use super::entry::batch_has_interrupt;
use super::path_safety::{ensure_regular_file, validate_log_path};

/// Upper bound on bytes read backwards when attaching.
const BACKFILL_MAX_BYTES: u64 = 512 * 1024;

/// An interrupt marker appeared in a session's transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptDetected {
    /// Session whose transcript contained the marker.
    pub session_id: String,
}

/// Read position within one transcript.
///
/// Only whole lines are consumed; a trailing partial line stays unread until
/// its newline arrives.
#[derive(Debug, Clone)]
pub struct TranscriptCursor {
    path: PathBuf,
    offset: u64,
}

impl TranscriptCursor {
    /// Cursor positioned at the current end of `path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be inspected.
    pub async fn at_end(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let offset = tokio::fs::metadata(&path)
            .await
            .map_err(|err| AppError::Io(format!("cannot stat transcript: {err}")))?
            .len();
        Ok(Self { path, offset })
    }

    /// Current read offset in bytes.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read complete lines appended since the last call.
    ///
    /// A file shorter than the offset is treated as truncated or rotated and
    /// read from the start.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PathViolation` if the path stopped being a regular
    /// file, or `AppError::Io` on read failure.
    pub async fn read_new(&mut self) -> Result<String> {
        ensure_regular_file(&self.path)?;

        let mut file = File::open(&self.path)
            .await
            .map_err(|err| AppError::Io(format!("cannot open transcript: {err}")))?;
        let len = file
            .metadata()
            .await
            .map_err(|err| AppError::Io(format!("cannot stat transcript: {err}")))?
            .len();

        if len < self.offset {
            debug!(path = %self.path.display(), "transcript truncated, rewinding");
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(String::new());
        }

        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(|err| AppError::Io(format!("cannot seek transcript: {err}")))?;
        let mut buf = Vec::new();
        (&mut file)
            .take(len - self.offset)
            .read_to_end(&mut buf)
            .await
            .map_err(|err| AppError::Io(format!("cannot read transcript: {err}")))?;

        let consumed = buf
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |index| index + 1);
        self.offset += consumed as u64;
        Ok(String::from_utf8_lossy(&buf[..consumed]).into_owned())
    }
}

/// Whether the last `max_lines` lines of `path` contain an interrupt.
///
/// # Errors
///
/// Returns `AppError::Io` if the file cannot be read.
pub async fn backfill_has_interrupt(path: &Path, max_lines: usize, marker: &str) -> Result<bool> {
    let mut file = File::open(path)
        .await
        .map_err(|err| AppError::Io(format!("cannot open transcript: {err}")))?;
    let len = file
        .metadata()
        .await
        .map_err(|err| AppError::Io(format!("cannot stat transcript: {err}")))?
        .len();
    let start = len.saturating_sub(BACKFILL_MAX_BYTES);

    file.seek(SeekFrom::Start(start))
        .await
        .map_err(|err| AppError::Io(format!("cannot seek transcript: {err}")))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .await
        .map_err(|err| AppError::Io(format!("cannot read transcript: {err}")))?;

    let text = String::from_utf8_lossy(&buf);
    let mut lines: Vec<&str> = text.lines().collect();
    if start > 0 && !lines.is_empty() {
        // First line is cut mid-record.
        lines.remove(0);
    }
    let tail_start = lines.len().saturating_sub(max_lines);
    Ok(batch_has_interrupt(lines[tail_start..].iter().copied(), marker))
}

/// Live tail of one session; cancels its task when dropped.
struct TailHandle {
    path: PathBuf,
    cancel: CancellationToken,
    _watcher: RecommendedWatcher,
    _task: JoinHandle<()>,
}

impl Drop for TailHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Registry of per-session transcript tails.
pub struct LogTailer {
    log_root: PathBuf,
    config: TailConfig,
    events: mpsc::UnboundedSender<InterruptDetected>,
    tails: HashMap<String, TailHandle>,
}

impl LogTailer {
    /// Create a tailer restricted to `log_root`, reporting on `events`.
    #[must_use]
    pub fn new(
        log_root: PathBuf,
        config: TailConfig,
        events: mpsc::UnboundedSender<InterruptDetected>,
    ) -> Self {
        Self {
            log_root,
            config,
            events,
            tails: HashMap::new(),
        }
    }

    /// Start tailing `path` for `session_id`.
    ///
    /// Re-attaching with the same path is a no-op; a different path replaces
    /// the existing tail. Returns `true` if the backfill scan of the last
    /// lines found an interrupt that happened before attachment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PathViolation` if the path is refused,
    /// `AppError::Io` if it cannot be read, or `AppError::Watch` if the
    /// watcher cannot be registered.
    pub async fn attach(&mut self, session_id: &str, path: &Path) -> Result<bool> {
        let path = validate_log_path(&self.log_root, path)?;

        if self
            .tails
            .get(session_id)
            .is_some_and(|tail| tail.path == path)
        {
            return Ok(false);
        }
        self.detach(session_id);

        let cursor = TranscriptCursor::at_end(&path).await?;
        let backfill_interrupt = match backfill_has_interrupt(
            &path,
            self.config.backfill_lines,
            &self.config.interrupt_marker,
        )
        .await
        {
            Ok(found) => found,
            Err(err) => {
                warn!(%err, session_id, "transcript backfill failed");
                false
            }
        };

        let (change_tx, change_rx) = mpsc::unbounded_channel::<()>();
        let file_name = path.file_name().map(OsString::from).unwrap_or_default();
        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if is_transcript_event(&event, &file_name) {
                        let _ = change_tx.send(());
                    }
                }
                Err(err) => {
                    warn!(%err, "transcript watcher error");
                }
            },
        )?;

        let watch_dir = path
            .parent()
            .ok_or_else(|| AppError::Watch("transcript has no parent directory".into()))?;
        watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            run_tail(
                session_id.to_owned(),
                cursor,
                change_rx,
                self.events.clone(),
                self.config.interrupt_marker.clone(),
                cancel.clone(),
            )
            .instrument(info_span!("log_tail", session_id)),
        );

        info!(session_id, path = %path.display(), "transcript tail attached");
        self.tails.insert(
            session_id.to_owned(),
            TailHandle {
                path,
                cancel,
                _watcher: watcher,
                _task: task,
            },
        );

        Ok(backfill_interrupt)
    }

    /// Stop tailing `session_id`. Returns `false` if it was not attached.
    pub fn detach(&mut self, session_id: &str) -> bool {
        let detached = self.tails.remove(session_id).is_some();
        if detached {
            info!(session_id, "transcript tail detached");
        }
        detached
    }

    /// Stop every tail.
    pub fn detach_all(&mut self) {
        self.tails.clear();
    }

    /// Whether `session_id` is being tailed.
    #[must_use]
    pub fn is_attached(&self, session_id: &str) -> bool {
        self.tails.contains_key(session_id)
    }

    /// Number of active tails.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tails.len()
    }

    /// Whether no tails are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tails.is_empty()
    }
}

async fn run_tail(
    session_id: String,
    mut cursor: TranscriptCursor,
    mut changes: mpsc::UnboundedReceiver<()>,
    events: mpsc::UnboundedSender<InterruptDetected>,
    marker: String,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("transcript tail cancelled");
                return;
            }
            change = changes.recv() => {
                if change.is_none() {
                    return;
                }
            }
        }

        // Coalesce a burst of notifications into one read.
        while changes.try_recv().is_ok() {}

        let batch = match cursor.read_new().await {
            Ok(batch) => batch,
            Err(err) => {
                warn!(%err, "failed to read transcript");
                continue;
            }
        };

        if batch_has_interrupt(batch.lines(), &marker) {
            info!("interrupt marker detected");
            if events
                .send(InterruptDetected {
                    session_id: session_id.clone(),
                })
                .is_err()
            {
                return;
            }
        }
    }
}

/// Whether a notify event touches the watched transcript.
fn is_transcript_event(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some_and(|name| name == file_name.as_os_str()))
}
