//! Warfront phantom host.
//!
//! Keeps a room alive with bots while no human hosts it. The transport is
//! stdio, so any relay can sit in front of it.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p warfront_net --bin phantom-host -- --scenario data/scenarios/channel.ron
//! cargo run -p warfront_net --bin phantom-host -- --scenario data/scenarios/channel.ron --config data/host.ron --seed 7
//! ```
//!
//! # Protocol
//!
//! Input (stdin): one frame per line, `{"peer":3,"event":...}`
//! Output (stdout): one envelope per line, `{"to":3,"message":{...}}`
//! Logs (stderr): filtered by `RUST_LOG`
//!
//! See the `runner` and `protocol` modules for the frame formats.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use warfront_core::config::SimConfig;
use warfront_core::scenario::ScenarioData;
use warfront_net::persistence::FileSnapshotStore;
use warfront_net::runner::{read_frames, run_phantom, wall_clock_ms, write_envelopes};
use warfront_net::{HostConfig, NetError, PhantomHost, Result};

#[derive(Parser)]
#[command(name = "phantom-host")]
#[command(about = "Bot-driven host for Warfront rooms, JSON lines on stdio")]
#[command(version)]
struct Cli {
    /// Scenario file (RON) that seeds every fresh round
    #[arg(short, long)]
    scenario: PathBuf,

    /// Host configuration (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulation configuration (RON)
    #[arg(long)]
    sim_config: Option<PathBuf>,

    /// Where the room snapshot lives
    #[arg(long, default_value = "phantom-snapshot.json")]
    snapshot: PathBuf,

    /// Override the configured room seed
    #[arg(long)]
    seed: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the protocol.
    let fallback = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "phantom host failed");
            ExitCode::FAILURE
        }
    }
}

fn joined(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    result.map_err(|e| NetError::Io(std::io::Error::other(e)))?
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    let sim_config = match &cli.sim_config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    let scenario = ScenarioData::load(&cli.scenario)?;
    tracing::info!(
        scenario = %scenario.name,
        room = %config.room_id,
        snapshot = %cli.snapshot.display(),
        "starting phantom host"
    );

    let tick_ms = sim_config.tick_ms;
    let store = FileSnapshotStore::new(cli.snapshot);
    let (host, opening) = PhantomHost::start(config, sim_config, store, scenario, wall_clock_ms())?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    for envelope in opening {
        out_tx
            .send(envelope)
            .map_err(|_| NetError::ChannelClosed("outbound"))?;
    }

    let reader = tokio::spawn(read_frames(BufReader::new(tokio::io::stdin()), event_tx));
    let writer = tokio::spawn(write_envelopes(tokio::io::stdout(), out_rx));

    let host = run_phantom(host, tick_ms, event_rx, out_tx, wall_clock_ms).await?;
    tracing::info!(round = host.room().round, humans = host.humans().len(), "room saved");

    joined(writer.await)?;
    joined(reader.await)
}
