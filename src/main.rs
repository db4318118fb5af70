#![forbid(unsafe_code)]

//! `agent-pulse` — session tracking daemon.
//!
//! Bootstraps configuration, starts the reconciliation coordinator and its
//! pollers, and serves hooks and queries over the local IPC socket.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_pulse::config::GlobalConfig;
use agent_pulse::hooks::{HookReceiver, DEFAULT_HOOK_QUEUE};
use agent_pulse::ipc::{spawn_ipc_server, IpcContext};
use agent_pulse::orchestrator::{Coordinator, Pollers};
use agent_pulse::process::{ProcessScanner, SignalProbe, WorkingDirResolver};
use agent_pulse::store::{SessionStore, SharedStore};
use agent_pulse::{AppError, Result};

/// Queue depth between pollers and the coordinator.
const SIGNAL_QUEUE: usize = 64;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-pulse", about = "AI assistant session tracker", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the IPC socket name.
    #[arg(long)]
    ipc_name: Option<String>,

    /// Override the transcript log root.
    #[arg(long)]
    log_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-pulse bootstrap");

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(name) = args.ipc_name {
        config.ipc_name = name;
    }
    if let Some(root) = args.log_root {
        config.log_root = root;
    }
    info!(
        process_name = %config.process_name,
        log_root = %config.log_root.display(),
        "configuration loaded"
    );

    // ── Wire signal sources ─────────────────────────────
    let ct = CancellationToken::new();
    let store = SessionStore::shared();
    let (hooks, hook_rx) = HookReceiver::channel(DEFAULT_HOOK_QUEUE);
    let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_QUEUE);

    let change_log = spawn_change_log(&store, ct.clone()).await;

    let coordinator = Coordinator::new(
        Arc::clone(&store),
        config.log_root.clone(),
        config.tail.clone(),
        config.placeholder_ttl(),
    );
    let coordinator_handle = tokio::spawn(coordinator.run(hook_rx, signal_rx, ct.clone()));

    let pollers = Pollers {
        scanner: ProcessScanner::system(config.process_name.clone()),
        probe: Arc::new(SignalProbe),
        resolver: Arc::new(WorkingDirResolver::from_config(&config.working_dir)),
    };
    let poller_handles = pollers.spawn(Arc::clone(&store), &config.intervals, signal_tx, &ct);

    let ipc_handle = spawn_ipc_server(
        &config.ipc_name,
        IpcContext {
            hooks,
            store: Arc::clone(&store),
        },
        ct.clone(),
    )?;

    info!("agent-pulse ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    for handle in poller_handles {
        let _ = handle.await;
    }
    let _ = tokio::join!(coordinator_handle, ipc_handle, change_log);
    info!("agent-pulse shut down");

    Ok(())
}

/// Log every store change at debug level.
async fn spawn_change_log(
    store: &SharedStore,
    ct: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut events = store.lock().await.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = ct.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        debug!(
                            change = ?event.change,
                            sessions = event.sessions.len(),
                            "session set changed"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change log lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
