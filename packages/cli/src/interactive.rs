//! Menu-driven runs using `dialoguer`, for when no subcommand is given.

use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input, Select};
use outbreak_cli_utils::MultiProgress;

use crate::stages::{Session, Stage};

/// Prompts for the configuration, the stage, and common overrides, then
/// runs the stage.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected stage fails.
pub fn run(multi: &MultiProgress, config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Outbreak Detection Toolchain");
    println!();

    let config_path = match config {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let input: String = Input::new()
                .with_prompt("Configuration file (empty for defaults)")
                .allow_empty(true)
                .interact_text()?;
            let input = input.trim();
            (!input.is_empty()).then(|| PathBuf::from(input))
        }
    };
    let mut config = crate::load_config(config_path.as_deref())?;

    let labels: Vec<&str> = Stage::ALL.iter().map(Stage::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to run?")
        .items(&labels)
        .default(0)
        .interact()?;
    let stage = Stage::ALL[idx];

    if matches!(stage, Stage::Scan | Stage::All)
        && Confirm::new()
            .with_prompt("Change Monte Carlo settings?")
            .default(false)
            .interact()?
    {
        config.scan.n_mc = Input::new()
            .with_prompt("Replicates per period")
            .default(config.scan.n_mc)
            .interact_text()?;
        config.scan.seed = prompt_optional_u64("Seed (empty for a random seed)")?;
    }

    let dir: String = Input::new()
        .with_prompt("Output directory")
        .default(config.output.dir.display().to_string())
        .interact_text()?;
    config.output.dir = PathBuf::from(dir);

    Session::open(config, multi)?.run(stage, multi)
}

fn prompt_optional_u64(prompt: &str) -> Result<Option<u64>, Box<dyn std::error::Error>> {
    let input: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;

    if input.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(input.trim().parse()?))
    }
}
