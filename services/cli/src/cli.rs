use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kpi_engine::config::{AppConfig, ThresholdConfig};
use kpi_engine::error::AppError;
use kpi_engine::telemetry;
use tracing::debug;

use crate::commands::{
    run_classify, run_suggest, run_synthesize, ClassifyArgs, SuggestArgs, SynthesizeArgs,
};
use crate::demo::{run_demo, DemoArgs};

#[derive(Parser, Debug)]
#[command(
    name = "kpi-engine",
    about = "Classify patients into attendance KPI tiers, suggest corrective edits and synthesize test scenarios",
    version
)]
struct Cli {
    /// JSON threshold document replacing the environment-configured minimums
    #[arg(long, global = true)]
    thresholds: Option<PathBuf>,
    /// Log filter (e.g. `debug`, `kpi_engine=trace`); overrides RUST_LOG and APP_LOG_LEVEL
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify every patient in a working set
    Classify(ClassifyArgs),
    /// List near-miss patients and the edits that would change their tier
    Suggest(SuggestArgs),
    /// Generate linked records from a scenario sheet and export them
    Synthesize(SynthesizeArgs),
    /// Run a self-contained synthesize, classify and suggest walkthrough
    Demo(DemoArgs),
}

pub(crate) fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(path) = &cli.thresholds {
        config.thresholds = ThresholdConfig::from_path(path)?;
    }

    telemetry::init(&config.telemetry, cli.log_level.as_deref())?;
    debug!(
        environment = ?config.environment,
        fiscal_year = %config.thresholds.fiscal_year.window(),
        "configuration loaded"
    );

    match cli.command {
        Command::Classify(args) => run_classify(&config, args),
        Command::Suggest(args) => run_suggest(&config, args),
        Command::Synthesize(args) => run_synthesize(&config, args),
        Command::Demo(args) => run_demo(&config, args),
    }
}
