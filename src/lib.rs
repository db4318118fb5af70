#![forbid(unsafe_code)]

//! `agent-pulse` tracks running AI coding-assistant sessions.
//!
//! Hook events, process-table scans, liveness probes and transcript tails
//! are reconciled into one observable set of session records.

pub mod config;
pub mod errors;
pub mod hooks;
pub mod ipc;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod store;
pub mod tail;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
