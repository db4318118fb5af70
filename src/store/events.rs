//! Change notifications published by the session store.

use serde::Serialize;

use crate::models::session::{Pid, SessionRecord, SessionStatus};

/// What a single store mutation did.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// A record was created or merged.
    Upserted {
        /// Affected pid.
        pid: Pid,
    },
    /// A record's status was set.
    StatusChanged {
        /// Affected pid.
        pid: Pid,
        /// New status.
        status: SessionStatus,
    },
    /// A real session id was bound to a record.
    Associated {
        /// Affected pid.
        pid: Pid,
        /// Bound session id.
        session_id: String,
    },
    /// Resource usage was refreshed.
    MetricsUpdated {
        /// Affected pid.
        pid: Pid,
    },
    /// A placeholder record moved onto its real pid.
    Rebound {
        /// Placeholder pid.
        from: Pid,
        /// Real pid.
        to: Pid,
    },
    /// A record was removed.
    Removed {
        /// The record as it was at removal.
        record: SessionRecord,
    },
}

/// Snapshot-changed notification.
///
/// `sessions` always carries the complete current snapshot; consumers should
/// replace their view rather than patch it.
#[derive(Debug, Clone, Serialize)]
pub struct StoreEvent {
    /// The mutation that produced this snapshot.
    pub change: Change,
    /// Every tracked record in insertion order.
    pub sessions: Vec<SessionRecord>,
}
