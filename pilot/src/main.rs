use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use pilot_protocol::RaceMessage;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::PilotConfig;
use crate::coordinator::{Coordinator, CoordinatorMessage};
use crate::link::{HttpRelayLink, LoggingLink};
use crate::recorder::Playback;

mod config;
mod coordinator;
mod link;
mod recorder;
mod strategy_task;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to the pilot configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Drive a live race: relay events arrive as JSON lines on stdin, power
    /// commands go out to the configured relay.
    Run {
        /// Skip journaling this race.
        #[arg(long)]
        no_record: bool,
    },
    /// Replay a recorded journal through the pilot without touching the
    /// relay.
    Replay { journal: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pilot=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run { no_record: false }) {
        Commands::Run { no_record } => run_live(config, !no_record).await,
        Commands::Replay { journal } => run_replay(config, &journal).await,
    }
}

async fn run_live(config: PilotConfig, record: bool) -> Result<(), Box<dyn std::error::Error>> {
    let link = HttpRelayLink::new(&config.relay_url);
    let recorder = record.then(|| recorder::spawn(config.journal_dir.clone()));
    let (coordinator, tx) = Coordinator::new(link, &config, recorder);
    let coordinator_task = tokio::spawn(coordinator.run());

    if let Some(url) = &config.announce_url {
        tx.send(CoordinatorMessage::Announce(url.clone())).await?;
    }
    spawn_keepalive(
        tx.clone(),
        Duration::from_millis(config.keepalive_interval_ms),
    );

    let pump = tokio::spawn(pump_stdin(tx.clone()));
    tokio::select! {
        _ = pump => info!("event stream closed"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    let _ = tx.send(CoordinatorMessage::Shutdown).await;
    drop(tx);
    let _ = coordinator_task.await;
    Ok(())
}

async fn run_replay(
    config: PilotConfig,
    journal: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let playback = Playback::open(journal)?;
    let (coordinator, tx) = Coordinator::new(LoggingLink, &config, None);
    let coordinator_task = tokio::spawn(coordinator.run());

    let (replay, stop) = recorder::spawn_replay(playback, tx.clone());
    tokio::select! {
        _ = replay => info!("replay finished"),
        _ = tokio::signal::ctrl_c() => {
            let _ = stop.send(()).await;
        }
    }

    let _ = tx.send(CoordinatorMessage::Shutdown).await;
    drop(tx);
    let _ = coordinator_task.await;
    Ok(())
}

fn spawn_keepalive(tx: mpsc::Sender<CoordinatorMessage>, interval: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        // the first tick fires immediately; skip it, the link is fresh
        tick.tick().await;
        loop {
            tick.tick().await;
            if tx.send(CoordinatorMessage::Keepalive).await.is_err() {
                break;
            }
        }
    });
}

async fn pump_stdin(tx: mpsc::Sender<CoordinatorMessage>) {
    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RaceMessage>(&line) {
            Ok(event) => {
                if tx.send(CoordinatorMessage::Relay(event)).await.is_err() {
                    break;
                }
            }
            Err(error) => warn!(%error, "ignoring malformed relay event"),
        }
    }
}
