#![forbid(unsafe_code)]

//! `bot-supervisor-ctl`: command-line companion for the control plane.
//!
//! Lists workers, shows one worker's record, submits start/stop/restart
//! commands through the control-plane HTTP API, and tails the supervisor
//! log file.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use bot_supervisor::control::http::ApiClient;
use bot_supervisor::models::remote::BotRecord;
use bot_supervisor::models::worker::ControlAction;
use bot_supervisor::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "bot-supervisor-ctl",
    about = "Command-line companion for bot-supervisor",
    version,
    long_about = None
)]
struct Cli {
    /// Control-plane base URL.
    #[arg(long, default_value = "http://localhost:3001")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every worker known to the control plane.
    List,

    /// Show one worker's record.
    Status {
        /// Worker name.
        name: String,
    },

    /// Ask the control plane to start a worker.
    Start {
        /// Worker name.
        name: String,
    },

    /// Ask the control plane to stop a worker.
    Stop {
        /// Worker name.
        name: String,
    },

    /// Ask the control plane to restart a worker.
    Restart {
        /// Worker name.
        name: String,
    },

    /// Print the last lines of the supervisor log file.
    Logs {
        /// Number of lines to print.
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,

        /// Log file written by `bot-supervisor --log-file`.
        #[arg(long, default_value = "/var/log/bot_supervisor.log")]
        file: PathBuf,
    },
}

fn main() {
    let args = Cli::parse();

    let result = match args.command {
        Command::Logs { lines, ref file } => show_logs(file, lines),
        ref command => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
            .and_then(|runtime| runtime.block_on(run_remote(&args.url, command))),
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run_remote(url: &str, command: &Command) -> Result<()> {
    let api = ApiClient::new(url)?;
    match command {
        Command::List => list_bots(&api).await,
        Command::Status { name } => {
            let bot = find_bot(&api, name).await?;
            print_record(&bot);
            Ok(())
        }
        Command::Start { name } => control(&api, name, ControlAction::Start).await,
        Command::Stop { name } => control(&api, name, ControlAction::Stop).await,
        Command::Restart { name } => control(&api, name, ControlAction::Restart).await,
        Command::Logs { .. } => Ok(()),
    }
}

async fn list_bots(api: &ApiClient) -> Result<()> {
    let bots = api.list_bots().await?;
    println!("{:<20} {:<15} {:<20} {:<8}", "NAME", "STATUS", "LAST PING", "PID");
    println!("{}", "-".repeat(66));
    for bot in &bots {
        println!(
            "{:<20} {:<15} {:<20} {:<8}",
            bot.name,
            bot.status.as_deref().unwrap_or("unknown"),
            bot.last_ping.as_deref().map_or("never", short_timestamp),
            bot.pid
                .as_ref()
                .filter(|pid| !pid.is_null())
                .map_or_else(|| "N/A".to_owned(), ToString::to_string),
        );
    }
    println!("\nTotal: {} workers", bots.len());
    Ok(())
}

async fn find_bot(api: &ApiClient, name: &str) -> Result<BotRecord> {
    api.list_bots()
        .await?
        .into_iter()
        .find(|bot| bot.name == name)
        .ok_or_else(|| AppError::NotFound(format!("worker {name}")))
}

fn print_record(bot: &BotRecord) {
    println!("Name:        {}", bot.name);
    println!("Status:      {}", bot.status.as_deref().unwrap_or("unknown"));
    println!(
        "Main file:   {}",
        bot.main_file.as_deref().unwrap_or("not set")
    );
    println!("Last ping:   {}", bot.last_ping.as_deref().unwrap_or("never"));
    println!(
        "Created:     {}",
        bot.created_at.as_deref().unwrap_or("unknown")
    );
    if let Some(description) = bot.description.as_deref().filter(|d| !d.is_empty()) {
        println!("Description: {description}");
    }
}

async fn control(api: &ApiClient, name: &str, action: ControlAction) -> Result<()> {
    let bot = find_bot(api, name).await?;
    let reply = api.control_bot(&bot.id_segment(), action).await?;
    if reply.success {
        println!(
            "OK: {}",
            reply.message.as_deref().unwrap_or("command sent")
        );
        Ok(())
    } else {
        Err(AppError::Http(
            reply.error.unwrap_or_else(|| "unknown error".into()),
        ))
    }
}

/// Trim an ISO timestamp to `YYYY-MM-DD HH:MM:SS`.
fn short_timestamp(raw: &str) -> &str {
    raw.get(..19).unwrap_or(raw)
}

fn show_logs(path: &Path, lines: usize) -> Result<()> {
    let file = File::open(path)
        .map_err(|err| AppError::NotFound(format!("log file {}: {err}", path.display())))?;

    let mut tail = VecDeque::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        let line = line?;
        if tail.len() == lines {
            tail.pop_front();
        }
        if lines > 0 {
            tail.push_back(line);
        }
    }
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
