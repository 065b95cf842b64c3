#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `outbreak`: prospective outbreak detection over a case point pattern.
//!
//! Each subcommand loads the TOML configuration (or defaults), applies any
//! flag overrides, and writes its reports to the output directory. Without
//! a subcommand an interactive menu picks the stage.
//!
//! Uses `indicatif-log-bridge` (via [`outbreak_cli_utils::init_logger`])
//! so that log lines and progress bars never fight for the terminal.

mod interactive;
mod stages;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use outbreak_ingest::AnalysisConfig;
use outbreak_scan::ReplicatePolicy;

use stages::{Session, Stage};

#[derive(Parser)]
#[command(name = "outbreak", about = "Outbreak detection for infectious-disease surveillance")]
struct Cli {
    /// TOML configuration file. Defaults apply to anything it leaves out.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
    /// Output directory (overrides `[output] dir`)
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate cases into monthly district and state counts
    Aggregate,
    /// Run the sliding-window frequentist and Bayesian scan statistics
    Scan(ScanArgs),
    /// Run the Hotelling T² control chart over state counts
    Hotelling(HotellingArgs),
    /// Run space-time cluster detection over individual cases
    Stcd(StcdArgs),
    /// Aggregate and run every detector
    Run {
        #[command(flatten)]
        scan: ScanArgs,
        #[command(flatten)]
        hotelling: HotellingArgs,
        #[command(flatten)]
        stcd: StcdArgs,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Look-back window in months
    #[arg(long)]
    window: Option<usize>,
    /// Monte Carlo replicates per period
    #[arg(long)]
    n_mc: Option<usize>,
    /// Monte Carlo seed
    #[arg(long, conflicts_with = "random_seed")]
    seed: Option<u64>,
    /// Seed from OS entropy (results are not reproducible)
    #[arg(long)]
    random_seed: bool,
    /// Replicate pooling: `accumulate` or `per_step`
    #[arg(long)]
    replicate_policy: Option<ReplicatePolicy>,
    /// First surveillance period
    #[arg(long)]
    start: Option<u32>,
    /// Last surveillance period
    #[arg(long)]
    end: Option<u32>,
}

impl ScanArgs {
    fn apply(&self, config: &mut AnalysisConfig) {
        let scan = &mut config.scan;
        if let Some(window) = self.window {
            scan.window = window;
        }
        if let Some(n_mc) = self.n_mc {
            scan.n_mc = n_mc;
        }
        if self.random_seed {
            scan.seed = None;
        } else if let Some(seed) = self.seed {
            scan.seed = Some(seed);
        }
        if let Some(policy) = self.replicate_policy {
            scan.replicate_policy = policy;
        }
        if self.start.is_some() {
            scan.start = self.start;
        }
        if self.end.is_some() {
            scan.end = self.end;
        }
    }
}

#[derive(Args)]
struct HotellingArgs {
    /// Significance level of the T² control limit
    #[arg(long = "hotelling-alpha")]
    alpha: Option<f64>,
}

impl HotellingArgs {
    fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(alpha) = self.alpha {
            config.hotelling.alpha = alpha;
        }
    }
}

#[derive(Args)]
struct StcdArgs {
    /// Case type to monitor
    #[arg(long)]
    case_type: Option<String>,
    /// Cluster radius in coordinate units
    #[arg(long)]
    radius: Option<f64>,
    /// Relative risk increase inside a cluster
    #[arg(long)]
    epsilon: Option<f64>,
    /// Alarm threshold
    #[arg(long)]
    threshold: Option<f64>,
    /// Use the CUSUM statistic instead of Shiryaev-Roberts
    #[arg(long)]
    cusum: bool,
}

impl StcdArgs {
    fn apply(&self, config: &mut AnalysisConfig) {
        let stcd = &mut config.stcd;
        if self.case_type.is_some() {
            stcd.case_type.clone_from(&self.case_type);
        }
        if let Some(radius) = self.radius {
            stcd.radius = radius;
        }
        if let Some(epsilon) = self.epsilon {
            stcd.epsilon = epsilon;
        }
        if let Some(threshold) = self.threshold {
            stcd.threshold = threshold;
        }
        if self.cusum {
            stcd.cusum = true;
        }
    }
}

/// Loads the configuration file, or defaults when none is given.
fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(outbreak_ingest::load_config(path)?),
        None => {
            log::info!("No configuration file given; using defaults");
            Ok(AnalysisConfig::default())
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = outbreak_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi, cli.config.as_deref());
    };

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(output) = cli.output {
        config.output.dir = output;
    }

    let stage = match &command {
        Commands::Aggregate => Stage::Aggregate,
        Commands::Scan(args) => {
            args.apply(&mut config);
            Stage::Scan
        }
        Commands::Hotelling(args) => {
            args.apply(&mut config);
            Stage::Hotelling
        }
        Commands::Stcd(args) => {
            args.apply(&mut config);
            Stage::Stcd
        }
        Commands::Run {
            scan,
            hotelling,
            stcd,
        } => {
            scan.apply(&mut config);
            hotelling.apply(&mut config);
            stcd.apply(&mut config);
            Stage::All
        }
    };

    Session::open(config, &multi)?.run(stage, &multi)
}
