//! Process-table scanning.
//!
//! One `ps` invocation per scan, filtered down to the monitored executable
//! and parsed into [`ProcessSample`]s. Lines that do not parse are skipped
//! individually.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::debug;

use crate::{AppError, Result};

use super::elapsed::parse_elapsed;

/// Executables whose own listing must never count as a match.
const QUERY_TOOLS: &[&str] = &["ps", "grep", "pgrep"];

/// One matching process from the table.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    /// OS process id.
    pub pid: u32,
    /// CPU usage percentage.
    pub cpu_percent: f64,
    /// Memory usage percentage.
    pub mem_percent: f64,
    /// Time since the process started.
    pub elapsed: Duration,
    /// Wall-clock start time derived from `elapsed`.
    pub start_time: DateTime<Utc>,
}

/// Result of one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// Every matching process.
    pub samples: Vec<ProcessSample>,
}

/// Source of raw process-table text.
///
/// Each line must carry `pid cpu% mem% etime command...`.
pub trait ProcessTable: Send + Sync {
    /// Run one query and return its standard output.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Scan`] if the query cannot run.
    fn query(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// [`ProcessTable`] backed by the system `ps`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PsProcessTable;

impl ProcessTable for PsProcessTable {
    fn query(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async {
            let output = Command::new("ps")
                .args(["-axo", "pid=,pcpu=,pmem=,etime=,command="])
                .stdin(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|err| AppError::Scan(format!("failed to spawn ps: {err}")))?;

            if !output.status.success() {
                return Err(AppError::Scan(format!("ps exited with {}", output.status)));
            }

            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }
}

/// Stateless scanner for one executable name.
#[derive(Clone)]
pub struct ProcessScanner {
    table: Arc<dyn ProcessTable>,
    process_name: String,
}

impl ProcessScanner {
    /// Create a scanner over `table` matching `process_name`.
    #[must_use]
    pub fn new(table: Arc<dyn ProcessTable>, process_name: impl Into<String>) -> Self {
        Self {
            table,
            process_name: process_name.into(),
        }
    }

    /// Scanner over the system `ps`.
    #[must_use]
    pub fn system(process_name: impl Into<String>) -> Self {
        Self::new(Arc::new(PsProcessTable), process_name)
    }

    /// Query the table once and parse every matching process.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Scan`] if the table query fails. Individual bad
    /// lines are skipped, not reported.
    pub async fn scan(&self) -> Result<ScanReport> {
        let raw = self.table.query().await?;
        let samples = parse_process_table(&raw, &self.process_name, Utc::now());
        debug!(matches = samples.len(), "process scan complete");
        Ok(ScanReport { samples })
    }
}

/// Parse every line of `raw` that belongs to `process_name`.
#[must_use]
pub fn parse_process_table(
    raw: &str,
    process_name: &str,
    now: DateTime<Utc>,
) -> Vec<ProcessSample> {
    raw.lines()
        .filter_map(|line| {
            let (sample, command) = parse_process_line(line, now)?;
            matches_process(command, process_name).then_some(sample)
        })
        .collect()
}

/// Parse a single `pid cpu mem etime command...` line.
///
/// Returns the sample and the command portion of the line.
#[must_use]
pub fn parse_process_line(line: &str, now: DateTime<Utc>) -> Option<(ProcessSample, &str)> {
    let (pid, rest) = split_field(line)?;
    let (cpu, rest) = split_field(rest)?;
    let (mem, rest) = split_field(rest)?;
    let (etime, rest) = split_field(rest)?;

    let pid = pid.parse::<u32>().ok()?;
    let cpu_percent = cpu.parse::<f64>().ok()?;
    let mem_percent = mem.parse::<f64>().ok()?;
    let elapsed = parse_elapsed(etime)?;
    let command = rest.trim();
    if command.is_empty() {
        return None;
    }

    let start_time = now.checked_sub_signed(chrono::Duration::from_std(elapsed).ok()?)?;
    Some((
        ProcessSample {
            pid,
            cpu_percent,
            mem_percent,
            elapsed,
            start_time,
        },
        command,
    ))
}

/// Split the leading whitespace-delimited field from `rest`.
fn split_field(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.trim_start();
    let end = rest.find(char::is_whitespace)?;
    Some(rest.split_at(end))
}

/// Whether `command` runs `process_name`, excluding the query tools.
fn matches_process(command: &str, process_name: &str) -> bool {
    let mut args = command.split_whitespace().map(basename);
    let Some(program) = args.next() else {
        return false;
    };
    if QUERY_TOOLS.contains(&program) {
        return false;
    }
    program == process_name || args.any(|arg| arg == process_name)
}

fn basename(arg: &str) -> &str {
    Path::new(arg)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(arg)
}
