#![forbid(unsafe_code)]

//! `bot-supervisor`: worker process supervisor daemon.
//!
//! Loads configuration, connects to the control plane, discovers and
//! supervises the workers under the configured root, and runs the crash
//! monitor, heartbeat, command and file-change loops until a shutdown
//! signal arrives.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, EnvFilter};

use bot_supervisor::config::{GlobalConfig, DEFAULT_CONFIG_PATH};
use bot_supervisor::control::client::ControlPlaneClient;
use bot_supervisor::control::{ArtifactSource, Uplink};
use bot_supervisor::supervisor::{commands, heartbeat, monitor};
use bot_supervisor::supervisor::{Supervisor, SupervisorSettings, Timings};
use bot_supervisor::sync::ArtifactSynchronizer;
use bot_supervisor::watcher::ChangeWatcher;
use bot_supervisor::{AppError, Result};

/// Capacity of the inbound control command queue.
const COMMAND_QUEUE: usize = 32;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "bot-supervisor", about = "Worker process supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; created with defaults if missing.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Also append log output to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Override the configured workers directory.
    #[arg(long)]
    workers_dir: Option<PathBuf>,
}

fn main() {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format, args.log_file.as_ref()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
    info!("bot-supervisor bootstrap");

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    if let Err(err) = result {
        error!(%err, "bot-supervisor failed");
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_or_init(&args.config)?;
    if let Some(dir) = args.workers_dir {
        config.bot.directory = dir;
    }
    info!(
        server = %config.server.url,
        workers = %config.bot.directory.display(),
        host = %config.system.name,
        "configuration loaded"
    );

    // ── Control-plane channel ───────────────────────────
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
    let client = ControlPlaneClient::start(&config.server.url, config.system.name.clone(), command_tx)?;
    let api: Arc<dyn ArtifactSource> = Arc::new(client.api().clone());
    let uplink: Arc<dyn Uplink> = client;

    // ── Supervisor and initial discovery ────────────────
    let supervisor = Arc::new(Supervisor::new(
        SupervisorSettings::from_config(&config),
        Timings::default(),
        uplink,
    ));
    match supervisor.discover().await {
        Ok(report) => info!(total = report.total, "initial discovery complete"),
        Err(err) => warn!(%err, "initial discovery failed"),
    }
    if config.bot.start_on_boot {
        let started = supervisor.start_all().await;
        info!(started, "workers started on boot");
    }

    // ── Change watcher ──────────────────────────────────
    let (change_tx, change_rx) = mpsc::unbounded_channel();
    match ChangeWatcher::start(&config.bot.directory, &config.bot.script_extension, change_tx) {
        Ok(watcher) => supervisor.attach_watcher(watcher),
        Err(err) => warn!(%err, "change watcher unavailable; file edits will not restart workers"),
    }

    // ── Background loops ────────────────────────────────
    let synchronizer = Arc::new(ArtifactSynchronizer::new(api, Arc::clone(&supervisor)));
    let monitor_handle = monitor::spawn_crash_monitor(Arc::clone(&supervisor));
    let heartbeat_handle =
        heartbeat::spawn_heartbeat(Arc::clone(&supervisor), config.heartbeat_interval());
    let command_handle =
        commands::spawn_command_loop(Arc::clone(&supervisor), synchronizer, command_rx);
    let restart_handle = commands::spawn_restart_consumer(Arc::clone(&supervisor), change_rx);
    info!("bot-supervisor ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    supervisor.shutdown().await;

    let _ = tokio::join!(monitor_handle, heartbeat_handle, command_handle, restart_handle);
    info!("bot-supervisor shut down");
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
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat, log_file: Option<&PathBuf>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| {
                    AppError::Config(format!("cannot open log file {}: {err}", path.display()))
                })?;
            BoxMakeWriter::new(std::io::stdout.and(Arc::new(file)))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none());

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
