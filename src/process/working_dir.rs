//! Cached working-directory resolution.
//!
//! Lookups are expensive on some platforms (an external tool per pid), so
//! results are cached per pid and at most one lookup per pid is ever in
//! flight. A failed lookup never replaces a previously resolved directory.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::WorkingDirConfig;

/// Platform strategy for reading a process's working directory.
pub trait CwdLookup: Send + Sync {
    /// Resolve the working directory of `pid`, or `None` on any failure.
    fn lookup(&self, pid: u32) -> Pin<Box<dyn Future<Output = Option<PathBuf>> + Send + '_>>;
}

/// Default [`CwdLookup`] for the current platform.
///
/// Linux reads the `/proc/<pid>/cwd` link. macOS asks `lsof` for the `cwd`
/// descriptor only, bounded by `timeout`. Other platforms report unknown.
#[derive(Debug, Clone, Copy)]
pub struct PlatformCwdLookup {
    timeout: Duration,
}

impl PlatformCwdLookup {
    /// Create a lookup whose external tool is killed after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CwdLookup for PlatformCwdLookup {
    fn lookup(&self, pid: u32) -> Pin<Box<dyn Future<Output = Option<PathBuf>> + Send + '_>> {
        Box::pin(platform_lookup(pid, self.timeout))
    }
}

#[cfg(target_os = "linux")]
async fn platform_lookup(pid: u32, _timeout: Duration) -> Option<PathBuf> {
    match tokio::fs::read_link(format!("/proc/{pid}/cwd")).await {
        Ok(path) => Some(path),
        Err(err) => {
            tracing::debug!(pid, %err, "cwd link unreadable");
            None
        }
    }
}

#[cfg(target_os = "macos")]
async fn platform_lookup(pid: u32, timeout: Duration) -> Option<PathBuf> {
    use std::process::Stdio;

    use tokio::process::Command;

    let output = Command::new("lsof")
        .args(["-a", "-p", &pid.to_string(), "-d", "cwd", "-Fn"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output).await {
        Ok(Ok(output)) => parse_lsof_cwd(&String::from_utf8_lossy(&output.stdout)),
        Ok(Err(err)) => {
            tracing::debug!(pid, %err, "failed to spawn lsof");
            None
        }
        Err(_) => {
            tracing::debug!(pid, "lsof timed out");
            None
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
async fn platform_lookup(_pid: u32, _timeout: Duration) -> Option<PathBuf> {
    None
}

/// Extract the path from `lsof -Fn` output (the line starting with `n`).
#[must_use]
pub fn parse_lsof_cwd(output: &str) -> Option<PathBuf> {
    output
        .lines()
        .find_map(|line| line.strip_prefix('n'))
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

#[derive(Debug)]
struct CacheEntry {
    directory: Option<PathBuf>,
    resolved_at: Instant,
}

#[derive(Debug, Default)]
struct ResolverState {
    entries: HashMap<u32, CacheEntry>,
    in_flight: HashSet<u32>,
}

impl ResolverState {
    fn purge(&mut self, purge_after: Duration) {
        self.entries
            .retain(|_, entry| entry.resolved_at.elapsed() < purge_after);
    }

    fn cached(&self, pid: u32) -> Option<PathBuf> {
        self.entries
            .get(&pid)
            .and_then(|entry| entry.directory.clone())
    }
}

/// Per-pid working-directory cache.
pub struct WorkingDirResolver {
    lookup: Arc<dyn CwdLookup>,
    fresh_for: Duration,
    purge_after: Duration,
    state: Mutex<ResolverState>,
}

impl WorkingDirResolver {
    /// Create a resolver over `lookup`.
    #[must_use]
    pub fn new(lookup: Arc<dyn CwdLookup>, fresh_for: Duration, purge_after: Duration) -> Self {
        Self {
            lookup,
            fresh_for,
            purge_after,
            state: Mutex::new(ResolverState::default()),
        }
    }

    /// Resolver over the platform lookup, tuned by `config`.
    #[must_use]
    pub fn from_config(config: &WorkingDirConfig) -> Self {
        Self::new(
            Arc::new(PlatformCwdLookup::new(Duration::from_millis(
                config.lookup_timeout_ms,
            ))),
            Duration::from_secs(config.fresh_seconds),
            Duration::from_secs(config.purge_seconds),
        )
    }

    /// Working directory of `pid`.
    ///
    /// Serves fresh cache hits directly. If a lookup for `pid` is already
    /// running, returns the last cached value instead of starting another.
    /// A failed lookup returns the previous cached value, if any.
    pub async fn working_dir(&self, pid: u32) -> Option<PathBuf> {
        {
            let mut state = self.state.lock().await;
            state.purge(self.purge_after);

            if let Some(entry) = state.entries.get(&pid) {
                if entry.resolved_at.elapsed() < self.fresh_for {
                    return entry.directory.clone();
                }
            }
            if state.in_flight.contains(&pid) {
                return state.cached(pid);
            }
            state.in_flight.insert(pid);
        }

        let resolved = self.lookup.lookup(pid).await;

        let mut state = self.state.lock().await;
        state.in_flight.remove(&pid);
        match resolved {
            Some(directory) => {
                state.entries.insert(
                    pid,
                    CacheEntry {
                        directory: Some(directory.clone()),
                        resolved_at: Instant::now(),
                    },
                );
                Some(directory)
            }
            None => {
                state.entries.entry(pid).or_insert_with(|| CacheEntry {
                    directory: None,
                    resolved_at: Instant::now(),
                });
                state.cached(pid)
            }
        }
    }

    /// Resolve many pids concurrently.
    ///
    /// Each pid is an independent attempt; only pids with a known directory
    /// appear in the result.
    pub async fn resolve_many(&self, pids: &[u32]) -> Vec<(u32, PathBuf)> {
        let attempts = pids
            .iter()
            .map(|&pid| async move { self.working_dir(pid).await.map(|dir| (pid, dir)) });
        join_all(attempts).await.into_iter().flatten().collect()
    }

    /// Number of cached entries (after purging stale ones).
    pub async fn cached_len(&self) -> usize {
        let mut state = self.state.lock().await;
        state.purge(self.purge_after);
        state.entries.len()
    }
}
