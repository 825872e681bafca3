#![forbid(unsafe_code)]

//! `agent-relay` — chat relay server binary.
//!
//! Bootstraps configuration, the worker process bridge, the serialized job
//! scheduler, and the WebSocket hub that connects chat clients to the
//! worker.

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use agent_relay::bridge::process::ProcessBridge;
use agent_relay::hub::publisher::HubPublisher;
use agent_relay::hub::server::{self, HubState};
use agent_relay::scheduler::queue::JobScheduler;
use agent_relay::{AppError, GlobalConfig, Result};

/// Capacity of the consumer-facing frame broadcast channel.
const FRAME_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-relay", about = "Chat relay server for a CLI reasoning agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (built-in defaults when omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the worker's project root.
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Override the hub listen port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-relay server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::defaults()?,
    };

    if let Some(root) = args.project_root {
        let canonical = root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid project root override: {err}")))?;
        config.worker.project_root = canonical;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    info!(
        command = %config.worker.command,
        project_root = %config.worker.project_root.display(),
        "configuration loaded"
    );

    // ── Build shared application state ──────────────────
    let (frames_tx, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
    let publisher = Arc::new(HubPublisher::new(frames_tx.clone()));
    let bridge = Arc::new(ProcessBridge::new(config.worker.clone()));
    let scheduler = Arc::new(JobScheduler::new(&config, bridge, publisher));

    let state = HubState {
        scheduler,
        frames: frames_tx,
        clients: Arc::new(AtomicUsize::new(0)),
        agent_name: config.relay.agent_name.clone(),
    };

    // ── Start the hub ───────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| AppError::Io(format!("failed to bind {addr}: {err}")))?;
    info!(%addr, "hub listening");

    let ct = CancellationToken::new();
    let shutdown_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        shutdown_ct.cancel();
    });

    server::serve(state, listener, ct).await?;
    info!("agent-relay shut down");

    Ok(())
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
    let subscriber = fmt().with_env_filter(env_filter);

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
