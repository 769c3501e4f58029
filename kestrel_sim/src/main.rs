// kestrel_sim/src/main.rs

//! Closed-loop runner for the MPC path-tracking controller.
//!
//! `kestrel --scenario assets/scenarios/01_sinusoid.toml -v`

use clap::Parser;
use kestrel_sim::cli::Cli;
use kestrel_sim::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

fn main() -> Result<(), SimError> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_target(false)
        .init();

    if cli.print_default {
        println!("{}", toml::to_string_pretty(&ScenarioConfig::default())?);
        return Ok(());
    }

    let scenarios = match &cli.scenario_dir {
        Some(dir) => discover_scenarios(dir),
        None => vec![cli.scenario.clone()],
    };
    if scenarios.is_empty() {
        return Err(SimError::InvalidScenario(
            "no scenario files found".to_string(),
        ));
    }

    let mut failures = 0;
    for path in &scenarios {
        match run_scenario(&cli, path) {
            Ok(summary) => info!(scenario = %path.display(), %summary, "run complete"),
            Err(err) => {
                // A batch keeps going; a single scenario reports its error.
                if scenarios.len() == 1 {
                    return Err(err);
                }
                failures += 1;
                error!(scenario = %path.display(), error = %err, "run failed");
            }
        }
    }

    if failures > 0 {
        return Err(SimError::InvalidScenario(format!(
            "{failures} of {} scenarios failed",
            scenarios.len()
        )));
    }
    Ok(())
}

fn run_scenario(cli: &Cli, path: &Path) -> Result<RunSummary, SimError> {
    info!(scenario = %path.display(), "loading scenario");
    let mut scenario = ScenarioConfig::load(path)?;
    if let Some(duration) = cli.duration {
        scenario.simulation.duration_seconds = duration;
    }
    if let Some(seed) = cli.seed {
        scenario.simulation.seed = Some(seed);
    }

    let mut simulation = Simulation::new(scenario)?;
    simulation.run()
}

/// Every `.toml` file under `dir`, sorted by path.
fn discover_scenarios(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();
    paths
}
