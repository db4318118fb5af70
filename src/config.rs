//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Polling cadences for the reconciliation loops (milliseconds).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IntervalConfig {
    /// Process-table scan interval.
    #[serde(default = "default_scan_ms")]
    pub scan_ms: u64,
    /// Liveness probe interval.
    #[serde(default = "default_liveness_ms")]
    pub liveness_ms: u64,
    /// Working-directory refresh interval.
    #[serde(default = "default_working_dir_ms")]
    pub working_dir_ms: u64,
    /// Delay before the first working-directory refresh.
    #[serde(default = "default_working_dir_initial_delay_ms")]
    pub working_dir_initial_delay_ms: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            scan_ms: default_scan_ms(),
            liveness_ms: default_liveness_ms(),
            working_dir_ms: default_working_dir_ms(),
            working_dir_initial_delay_ms: default_working_dir_initial_delay_ms(),
        }
    }
}

impl IntervalConfig {
    /// Scan interval as a [`Duration`].
    #[must_use]
    pub fn scan(&self) -> Duration {
        Duration::from_millis(self.scan_ms)
    }

    /// Liveness interval as a [`Duration`].
    #[must_use]
    pub fn liveness(&self) -> Duration {
        Duration::from_millis(self.liveness_ms)
    }

    /// Working-directory interval as a [`Duration`].
    #[must_use]
    pub fn working_dir(&self) -> Duration {
        Duration::from_millis(self.working_dir_ms)
    }

    /// Initial working-directory delay as a [`Duration`].
    #[must_use]
    pub fn working_dir_initial_delay(&self) -> Duration {
        Duration::from_millis(self.working_dir_initial_delay_ms)
    }
}

/// Working-directory cache tuning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkingDirConfig {
    /// Age under which a cached entry is served without a lookup.
    #[serde(default = "default_fresh_seconds")]
    pub fresh_seconds: u64,
    /// Age after which a cached entry is dropped entirely.
    #[serde(default = "default_purge_seconds")]
    pub purge_seconds: u64,
    /// Upper bound on the external lookup tool.
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

impl Default for WorkingDirConfig {
    fn default() -> Self {
        Self {
            fresh_seconds: default_fresh_seconds(),
            purge_seconds: default_purge_seconds(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

/// Transcript tailing settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TailConfig {
    /// Number of trailing lines inspected when a tailer attaches.
    #[serde(default = "default_backfill_lines")]
    pub backfill_lines: usize,
    /// Substring that marks a user-initiated interrupt.
    #[serde(default = "default_interrupt_marker")]
    pub interrupt_marker: String,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            backfill_lines: default_backfill_lines(),
            interrupt_marker: default_interrupt_marker(),
        }
    }
}

fn default_scan_ms() -> u64 {
    1000
}

fn default_liveness_ms() -> u64 {
    1000
}

fn default_working_dir_ms() -> u64 {
    5000
}

fn default_working_dir_initial_delay_ms() -> u64 {
    2000
}

fn default_fresh_seconds() -> u64 {
    30
}

fn default_purge_seconds() -> u64 {
    60
}

fn default_lookup_timeout_ms() -> u64 {
    2000
}

fn default_backfill_lines() -> usize {
    50
}

fn default_interrupt_marker() -> String {
    "[Request interrupted by user".into()
}

fn default_ipc_name() -> String {
    "agent-pulse".into()
}

fn default_process_name() -> String {
    "claude".into()
}

fn default_placeholder_ttl_seconds() -> u64 {
    1800
}

fn default_log_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("projects")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Named pipe / Unix socket identifier for hook delivery.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Executable name matched against the process table.
    #[serde(default = "default_process_name")]
    pub process_name: String,
    /// Directory tree transcript logs must live under.
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
    /// Idle time after which a never-correlated placeholder is dropped.
    #[serde(default = "default_placeholder_ttl_seconds")]
    pub placeholder_ttl_seconds: u64,
    /// Loop cadences.
    #[serde(default)]
    pub intervals: IntervalConfig,
    /// Working-directory cache settings.
    #[serde(default)]
    pub working_dir: WorkingDirConfig,
    /// Transcript tail settings.
    #[serde(default)]
    pub tail: TailConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            ipc_name: default_ipc_name(),
            process_name: default_process_name(),
            log_root: default_log_root(),
            placeholder_ttl_seconds: default_placeholder_ttl_seconds(),
            intervals: IntervalConfig::default(),
            working_dir: WorkingDirConfig::default(),
            tail: TailConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Placeholder staleness bound as a [`Duration`].
    #[must_use]
    pub fn placeholder_ttl(&self) -> Duration {
        Duration::from_secs(self.placeholder_ttl_seconds)
    }

    fn validate(&self) -> Result<()> {
        let intervals = &self.intervals;
        if intervals.scan_ms == 0 || intervals.liveness_ms == 0 || intervals.working_dir_ms == 0 {
            return Err(AppError::Config(
                "loop intervals must be greater than zero".into(),
            ));
        }

        if self.working_dir.purge_seconds < self.working_dir.fresh_seconds {
            return Err(AppError::Config(
                "working_dir.purge_seconds must not be less than fresh_seconds".into(),
            ));
        }

        if self.process_name.trim().is_empty() {
            return Err(AppError::Config("process_name must not be empty".into()));
        }

        if self.tail.interrupt_marker.is_empty() {
            return Err(AppError::Config(
                "tail.interrupt_marker must not be empty".into(),
            ));
        }

        Ok(())
    }
}
