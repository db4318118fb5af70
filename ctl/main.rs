#![forbid(unsafe_code)]

//! `agent-pulse-ctl` — local CLI companion for `agent-pulse`.
//!
//! Delivers lifecycle hooks from assistant hook scripts and queries the
//! tracked session set over the IPC socket.

use std::io::{BufRead, BufReader, Read, Write};

use clap::{Parser, Subcommand, ValueEnum};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "agent-pulse-ctl",
    about = "Local CLI for the agent-pulse daemon",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the daemon's `ipc_name` config).
    #[arg(long, default_value = "agent-pulse")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

/// Hook kinds, mirrored locally because the ctl binary does not depend on
/// the library crate.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum HookKind {
    SessionStart,
    RequestStart,
    RequestStop,
}

impl HookKind {
    fn wire_name(self) -> &'static str {
        match self {
            Self::SessionStart => "session_start",
            Self::RequestStart => "request_start",
            Self::RequestStop => "request_stop",
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Deliver a lifecycle hook.
    Hook {
        /// Hook kind.
        #[arg(value_enum)]
        kind: HookKind,
        /// Session identifier. Required unless `--stdin` supplies it.
        #[arg(long)]
        session_id: Option<String>,
        /// Process id of the assistant.
        #[arg(long)]
        pid: Option<u32>,
        /// Transcript log path.
        #[arg(long)]
        transcript_path: Option<String>,
        /// Read the hook's JSON payload from stdin and merge explicit flags
        /// over it.
        #[arg(long)]
        stdin: bool,
    },

    /// List tracked sessions.
    List,

    /// Show aggregate session counts.
    Stats,
}

fn main() {
    let args = Cli::parse();

    let request_json = match build_request(&args.command) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(2);
        }
    };

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to daemon: {err}");
            eprintln!("Is agent-pulse running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

fn build_request(command: &Command) -> Result<serde_json::Value, String> {
    match command {
        Command::List => Ok(serde_json::json!({ "command": "list" })),
        Command::Stats => Ok(serde_json::json!({ "command": "stats" })),
        Command::Hook {
            kind,
            session_id,
            pid,
            transcript_path,
            stdin,
        } => {
            let mut event = if *stdin {
                read_stdin_payload()?
            } else {
                serde_json::Map::new()
            };
            event.insert("type".into(), kind.wire_name().into());
            if let Some(id) = session_id {
                event.insert("session_id".into(), id.clone().into());
            }
            if let Some(pid) = pid {
                event.insert("pid".into(), (*pid).into());
            }
            if let Some(path) = transcript_path {
                event.insert("transcript_path".into(), path.clone().into());
            }
            if !event.contains_key("session_id") && !event.contains_key("sessionId") {
                return Err("a session id is required (--session-id or --stdin)".into());
            }
            Ok(serde_json::json!({ "command": "hook", "event": event }))
        }
    }
}

fn read_stdin_payload() -> Result<serde_json::Map<String, serde_json::Value>, String> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .map_err(|err| format!("failed to read stdin: {err}"))?;
    if raw.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err("stdin payload must be a JSON object".into()),
        Err(err) => Err(format!("invalid stdin payload: {err}")),
    }
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
