//! Reconciliation of hook, scan, liveness and transcript signals.
//!
//! Pollers observe the system on their own tasks; the coordinator applies
//! what they observe, one signal at a time.

pub mod coordinator;
pub mod pollers;
pub mod signal;

pub use coordinator::Coordinator;
pub use pollers::Pollers;
pub use signal::Signal;
