//! mediasync - Run simulated media synchronization sessions
//!
//! Drives the mediasync control loop against a simulated media device, timing
//! object and host, as described by a TOML scenario, and prints what the loop
//! did.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mediasync_cli::{run_scenario, Scenario};
use mediasync_core::UpdateStrategy;

#[derive(Parser)]
#[command(name = "mediasync")]
#[command(author, version, about = "Simulated media synchronization sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Scenario file path (default: ~/.config/mediasync/scenario.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Correction strategy: gradual or stepwise
    #[arg(short, long)]
    strategy: Option<UpdateStrategy>,

    /// Simulated run time in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Display refresh interval in milliseconds
    #[arg(long)]
    frame_ms: Option<u64>,

    /// Probe the simulated device for its supported rates
    #[arg(long)]
    detect_rates: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default scenario file
    Init,
    /// Show the scenario file path
    ConfigPath,
    /// Print the effective scenario as TOML
    ShowConfig,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init) => {
            let path = Scenario::create_default_config_file()?;
            println!("Created default scenario at: {}", path.display());
            return Ok(());
        }
        Some(Commands::ConfigPath) => {
            let path = Scenario::config_path()?;
            println!("{}", path.display());
            return Ok(());
        }
        Some(Commands::ShowConfig) | None => {}
    }

    // Load scenario
    let mut scenario = match &cli.config {
        Some(path) => {
            Scenario::load_from(path).with_context(|| format!("Failed to load scenario {}", path.display()))?
        }
        None => Scenario::load_or_default(),
    };

    // Apply CLI overrides
    if let Some(strategy) = cli.strategy {
        scenario.session.strategy = strategy;
    }
    if let Some(duration) = cli.duration {
        scenario.session.duration_secs = duration;
    }
    if let Some(frame_ms) = cli.frame_ms {
        scenario.host.frame_ms = frame_ms;
    }
    if cli.detect_rates {
        scenario.session.detect_rates = true;
    }

    if matches!(cli.command, Some(Commands::ShowConfig)) {
        let content = toml::to_string_pretty(&scenario).context("Failed to serialize scenario")?;
        print!("{}", content);
        return Ok(());
    }

    let summary = run_scenario(&scenario)?;
    println!("{}", summary);
    Ok(())
}
