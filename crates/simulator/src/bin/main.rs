//! Mesh root simulator CLI.

use anyhow::Context;
use clap::Parser;
use meshroot_simulator::{Simulator, SimulatorConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshroot-sim")]
#[command(about = "Simulate mesh onboarding and vendor messaging")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Random seed (overrides the file)
    #[arg(long)]
    seed: Option<u64>,

    /// Simulated seconds to run (overrides the file)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Number of matching devices (overrides the file)
    #[arg(long)]
    devices: Option<usize>,

    /// Provisioning quota (overrides the file)
    #[arg(long)]
    quota: Option<u32>,

    /// Probability an AppKey-Add goes unanswered
    #[arg(long)]
    config_loss: Option<f64>,

    /// Probability a directed message goes unanswered
    #[arg(long)]
    message_loss: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            SimulatorConfig::from_toml(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => SimulatorConfig::default(),
    };

    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    if let Some(secs) = cli.duration {
        config = config.with_duration(Duration::from_secs(secs));
    }
    if let Some(devices) = cli.devices {
        config.network.devices = devices;
    }
    if let Some(quota) = cli.quota {
        config.provisioner.max_node_num = quota;
    }
    if let Some(rate) = cli.config_loss {
        config.network.config_loss_rate = rate;
    }
    if let Some(rate) = cli.message_loss {
        config.network.message_loss_rate = rate;
    }

    let report = Simulator::new(config)
        .context("setting up simulation")?
        .run();
    println!("{report}");
    Ok(())
}
