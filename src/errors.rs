//! Error types shared across the daemon.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// IPC communication failure.
    Ipc(String),
    /// Transcript path failed validation against the allow-listed log root.
    PathViolation(String),
    /// Process-table query or parse failure.
    Scan(String),
    /// Hook payload was rejected.
    Hook(String),
    /// File watcher could not be created or registered.
    Watch(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::Scan(msg) => write!(f, "scan: {msg}"),
            Self::Hook(msg) => write!(f, "hook: {msg}"),
            Self::Watch(msg) => write!(f, "watch: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<notify::Error> for AppError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}
