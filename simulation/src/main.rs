//! Coscene - multi-peer scene sync simulation
//!
//! Runs several peers over an in-memory hub that can drop and duplicate
//! deliveries, then prints a convergence report as JSON.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use coscene_node::{NodeConfig, SceneNode};
use coscene_sim::{SimConfig, run};

#[derive(Parser)]
#[command(
    name = "coscene-sim",
    about = "Shared scene sync simulation over a lossy in-memory hub",
    version
)]
struct Cli {
    /// Number of peers present from the start
    #[arg(short, long, default_value = "3")]
    peers: usize,

    /// Number of random edits to perform
    #[arg(short, long, default_value = "100")]
    ops: usize,

    /// Probability that a single delivery is lost
    #[arg(long, default_value = "0.0")]
    drop: f64,

    /// Probability that a single delivery arrives twice
    #[arg(long, default_value = "0.0")]
    duplicate: f64,

    /// Seed for the edit sequence
    #[arg(short, long, default_value = "7")]
    seed: u64,

    /// Milliseconds between edits
    #[arg(long, default_value = "150")]
    interval_ms: u64,

    /// Milliseconds to wait for the system to go quiet
    #[arg(long, default_value = "3000")]
    settle_ms: u64,

    /// Skip the late-joining peer
    #[arg(long)]
    no_late_joiner: bool,

    /// Node config (TOML) shared by every peer
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "coscene_sync=debug"; overrides the config file
    #[arg(short, long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut node_config = match &cli.config {
        Some(path) => NodeConfig::load(path).await?,
        None => NodeConfig::default(),
    };
    if let Some(level) = cli.log {
        node_config.logging.level = level;
    }
    let _guard = SceneNode::new(node_config.clone()).init_logging()?;

    let report = run(SimConfig {
        peers: cli.peers,
        ops: cli.ops,
        drop_probability: cli.drop,
        duplicate_probability: cli.duplicate,
        seed: cli.seed,
        op_interval: Duration::from_millis(cli.interval_ms),
        settle: Duration::from_millis(cli.settle_ms),
        late_joiner: !cli.no_late_joiner,
        node: node_config,
    })
    .await?;

    println!("{}", report.to_json()?);
    if !report.converged {
        eprintln!("peers diverged");
    }
    Ok(())
}
