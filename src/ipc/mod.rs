//! Local IPC layer for hook delivery and `agent-pulse-ctl` queries.
//!
//! Provides a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! server that accepts JSON-line commands.

pub mod server;

pub use server::{handle_line, spawn_ipc_server, IpcContext, IpcRequest, IpcResponse};
