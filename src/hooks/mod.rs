//! Entry point for lifecycle hooks pushed by the assistant.
//!
//! The receiver validates each event and hands it to the coordinator over a
//! bounded channel. It never touches the store directly.

use tokio::sync::mpsc;
use tracing::debug;

use crate::models::hook::HookEvent;
use crate::{AppError, Result};

/// Default queue depth between receivers and the coordinator.
pub const DEFAULT_HOOK_QUEUE: usize = 256;

/// Cloneable sender side of the hook queue.
#[derive(Debug, Clone)]
pub struct HookReceiver {
    tx: mpsc::Sender<HookEvent>,
}

impl HookReceiver {
    /// Create a receiver and the queue the coordinator drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<HookEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Validate and enqueue one event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Hook` if the event is invalid or the coordinator
    /// has stopped.
    pub async fn receive(&self, event: HookEvent) -> Result<()> {
        validate(&event)?;
        debug!(session_id = %event.session_id, kind = ?event.kind, "hook received");
        self.tx
            .send(event)
            .await
            .map_err(|_| AppError::Hook("coordinator is not running".into()))
    }

    /// Parse a raw JSON payload, then [`receive`](Self::receive) it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Hook` for malformed or invalid payloads.
    pub async fn receive_json(&self, payload: serde_json::Value) -> Result<HookEvent> {
        let event: HookEvent = serde_json::from_value(payload)
            .map_err(|err| AppError::Hook(format!("malformed hook event: {err}")))?;
        self.receive(event.clone()).await?;
        Ok(event)
    }
}

/// Reject events the coordinator could not bind to a session.
///
/// # Errors
///
/// Returns `AppError::Hook` for an empty session id or a zero pid.
pub fn validate(event: &HookEvent) -> Result<()> {
    if event.session_id.trim().is_empty() {
        return Err(AppError::Hook("session_id must not be empty".into()));
    }
    if event.pid == Some(0) {
        return Err(AppError::Hook("pid must be positive".into()));
    }
    Ok(())
}
