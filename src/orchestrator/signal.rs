//! Inputs applied by the coordinator.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::models::hook::HookEvent;
use crate::process::ScanReport;

/// One observation from any signal source.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Lifecycle hook pushed by the assistant.
    Hook(HookEvent),
    /// Interrupt marker found in a session transcript.
    Interrupt {
        /// Session whose transcript contained the marker.
        session_id: String,
    },
    /// Fresh process-table scan.
    Scan(ScanReport),
    /// Result of probing every tracked real pid.
    Liveness {
        /// Pids whose probe failed.
        dead: Vec<u32>,
        /// When the probes ran.
        checked_at: DateTime<Utc>,
    },
    /// Successfully resolved working directories.
    WorkingDirs(Vec<(u32, PathBuf)>),
}

impl Signal {
    /// Short label for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hook(_) => "hook",
            Self::Interrupt { .. } => "interrupt",
            Self::Scan(_) => "scan",
            Self::Liveness { .. } => "liveness",
            Self::WorkingDirs(_) => "working_dirs",
        }
    }
}
