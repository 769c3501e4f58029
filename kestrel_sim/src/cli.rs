// kestrel_sim/src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// Kestrel: closed-loop simulator for the MPC path-tracking controller.
///
/// Drives the controller against a simulated vehicle with actuation latency
/// and reports how closely it followed the track.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/00_circle.toml")]
    pub scenario: PathBuf,

    /// Run every scenario found under this directory instead of `--scenario`.
    #[arg(long)]
    pub scenario_dir: Option<PathBuf>,

    /// Override the simulated duration (s).
    #[arg(long)]
    pub duration: Option<f64>,

    /// Override the random seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the default scenario as TOML and exit.
    #[arg(long, default_value_t = false)]
    pub print_default: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
