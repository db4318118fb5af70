//! Lifecycle hook payloads.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionStatus;

/// Lifecycle hook kinds emitted by the monitored assistant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// A session was opened.
    SessionStart,
    /// The user submitted a request.
    RequestStart,
    /// The assistant finished responding.
    RequestStop,
}

impl HookKind {
    /// Status implied by this hook.
    #[must_use]
    pub fn target_status(self) -> SessionStatus {
        match self {
            Self::SessionStart | Self::RequestStop => SessionStatus::Idle,
            Self::RequestStart => SessionStatus::Running,
        }
    }
}

/// One hook event as delivered over IPC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HookEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: HookKind,
    /// Logical session id.
    #[serde(alias = "sessionId")]
    pub session_id: String,
    /// OS process id, when the sender knows it.
    #[serde(default)]
    pub pid: Option<u32>,
    /// Transcript log for the session.
    #[serde(default, alias = "transcriptPath")]
    pub transcript_path: Option<PathBuf>,
    /// Sender-side timestamp.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}
