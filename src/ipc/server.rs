//! Local IPC server for hook delivery and `agent-pulse-ctl` queries.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Each line is one JSON command.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "hook", "event": {"type": "request_start", "session_id": "abc", "pid": 4242}}
//! {"command": "list"}
//! {"command": "stats"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "unknown command: foo"}
//! ```

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::hooks::HookReceiver;
use crate::store::SharedStore;
use crate::{AppError, Result};

/// What a connection handler can reach.
#[derive(Debug, Clone)]
pub struct IpcContext {
    /// Hook intake.
    pub hooks: HookReceiver,
    /// Read access to tracked sessions.
    pub store: SharedStore,
}

/// Inbound IPC request.
#[derive(Debug, Deserialize)]
pub struct IpcRequest {
    /// Command verb.
    pub command: String,
    /// Hook payload (for `hook`).
    #[serde(default)]
    pub event: Option<serde_json::Value>,
}

/// Outbound IPC response.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct IpcResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Spawn the IPC server task on the socket called `name`.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    name: &str,
    context: IpcContext,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = name.to_owned();
    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("ipc_server", name = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                tokio::spawn(handle_connection(stream, context.clone()));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

async fn handle_connection(stream: interprocess::local_socket::tokio::Stream, context: IpcContext) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let response = handle_line(&line, &context).await;
                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        debug!("IPC connection closed");
    }
    .instrument(span)
    .await;
}

/// Decode and execute one request line.
///
/// Blank lines and malformed JSON produce an error response rather than
/// closing the connection.
pub async fn handle_line(line: &str, context: &IpcContext) -> IpcResponse {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return IpcResponse::error("empty request");
    }
    match serde_json::from_str::<IpcRequest>(trimmed) {
        Ok(request) => dispatch_command(request, context).await,
        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
    }
}

async fn dispatch_command(request: IpcRequest, context: &IpcContext) -> IpcResponse {
    let span = info_span!("ipc_command", command = %request.command);
    async move {
        match request.command.as_str() {
            "hook" => handle_hook(request.event, context).await,
            "list" => handle_list(context).await,
            "stats" => handle_stats(context).await,
            other => IpcResponse::error(format!("unknown command: {other}")),
        }
    }
    .instrument(span)
    .await
}

async fn handle_hook(event: Option<serde_json::Value>, context: &IpcContext) -> IpcResponse {
    let Some(payload) = event else {
        return IpcResponse::error("missing required 'event' field");
    };
    match context.hooks.receive_json(payload).await {
        Ok(event) => IpcResponse::success(serde_json::json!({
            "accepted": true,
            "session_id": event.session_id,
        })),
        Err(err) => {
            warn!(%err, "hook rejected");
            IpcResponse::error(err.to_string())
        }
    }
}

async fn handle_list(context: &IpcContext) -> IpcResponse {
    let sessions = context.store.lock().await.all();
    match serde_json::to_value(&sessions) {
        Ok(data) => IpcResponse::success(serde_json::json!({ "sessions": data })),
        Err(err) => IpcResponse::error(format!("failed to encode sessions: {err}")),
    }
}

async fn handle_stats(context: &IpcContext) -> IpcResponse {
    let stats = context.store.lock().await.stats();
    match serde_json::to_value(stats) {
        Ok(data) => IpcResponse::success(data),
        Err(err) => IpcResponse::error(format!("failed to encode stats: {err}")),
    }
}
