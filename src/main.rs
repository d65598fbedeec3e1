//! CostLens - cloud cost analytics
//!
//! Reads billing records or resource inventories as JSON and prints the
//! analysis as JSON on stdout. Logs go to stderr and `~/.costlens/logs/`.
//!
//! ## Usage
//!
//! ```bash
//! # Flag anomalous spend
//! costlens anomalies --input billing.json
//!
//! # 30 day forecast, keeping the fitted model
//! costlens forecast --input billing.json --days 30 --save-model model.json
//!
//! # Rightsizing, storage and reserved-instance recommendations
//! costlens optimize --input inventory.json
//!
//! # Budget tier projection
//! costlens budget --current 180000 --budget 250000
//!
//! # Custom engine settings and verbose logging
//! costlens -v --config engine.yaml anomalies --input billing.json
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use costlens_core::{CoreError, LogGuard, init_logging};
use costlens_engine::{CostAnomalyDetector, CostRecord, EngineConfig, ResourceInventory};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, info};

/// CostLens cost analytics
///
/// Anomaly detection, forecasting and optimization recommendations
/// over cloud billing data.
#[derive(Parser, Debug)]
#[command(name = "costlens")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.costlens/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on billing records and flag anomalies
    Anomalies {
        /// JSON array of cost records
        #[arg(short, long)]
        input: PathBuf,

        /// Score these records instead of the training set
        #[arg(long)]
        score: Option<PathBuf>,

        /// Include normal records in the output
        #[arg(long)]
        all: bool,
    },

    /// Forecast daily spend
    Forecast {
        /// JSON array of cost records
        #[arg(short, long, required_unless_present = "load_model")]
        input: Option<PathBuf>,

        /// Days to forecast
        #[arg(short, long, default_value_t = 30)]
        days: u32,

        /// Write the fitted model to this path
        #[arg(long)]
        save_model: Option<PathBuf>,

        /// Use a previously saved model instead of training
        #[arg(long, conflicts_with = "input")]
        load_model: Option<PathBuf>,
    },

    /// Recommend rightsizing, storage tiering and reserved capacity
    Optimize {
        /// JSON resource inventory with instances, storage and utilization
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Project savings for a budget tier
    Budget {
        /// Current monthly spend in USD
        #[arg(long)]
        current: f64,

        /// Monthly budget in USD
        #[arg(long)]
        budget: f64,
    },
}

#[derive(Serialize)]
struct AnomalyOutput {
    summary: costlens_engine::AnomalySummary,
    alerts: Vec<costlens_engine::Alert>,
    results: Vec<costlens_engine::AnomalyResult>,
}

#[derive(Serialize)]
struct ForecastOutput {
    forecast: Vec<costlens_engine::ForecastPoint>,
    trend_analysis: costlens_engine::TrendAnalysis,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            if let Some(hint) = e.guidance() {
                eprintln!("Hint: {}", hint);
            }
            return ExitCode::from(1);
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("costlens failed: {:#}", e);
            match e.downcast_ref::<costlens_engine::EngineError>() {
                Some(engine) => eprintln!("Error: {}", engine.friendly_message()),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> costlens_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    if !path.exists() {
        return Err(CoreError::config_not_found(path).into());
    }
    EngineConfig::from_yaml_file(path)
        .with_context(|| format!("loading engine config from {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

/// Billing records ordered by timestamp.
fn read_records(path: &Path) -> anyhow::Result<Vec<CostRecord>> {
    let mut records: Vec<CostRecord> = read_json(path)?;
    if records.is_empty() {
        bail!("{} contains no cost records", path.display());
    }
    records.sort_by_key(|r| r.timestamp);
    info!(path = %path.display(), records = records.len(), "cost records loaded");
    Ok(records)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Command::Anomalies { input, score, all } => {
            let training = read_records(input)?;
            let mut detector = config.detector();
            detector.train(&training)?;

            let scored = match score {
                Some(path) => read_records(path)?,
                None => training,
            };
            let results = detector.detect(&scored)?;

            let output = AnomalyOutput {
                summary: CostAnomalyDetector::summarize(&results),
                alerts: CostAnomalyDetector::alert(&results, &config.alerts),
                results: results.into_iter().filter(|r| *all || r.is_anomaly).collect(),
            };
            print_json(&output, cli.pretty)
        }

        Command::Forecast {
            input,
            days,
            save_model,
            load_model,
        } => {
            let mut forecaster = config.forecaster();
            match (input, load_model) {
                (_, Some(path)) => {
                    forecaster.load_model(path)?;
                }
                (Some(path), None) => {
                    forecaster.train(&read_records(path)?)?;
                }
                (None, None) => bail!("either --input or --load-model is required"),
            }

            if let Some(path) = save_model {
                forecaster.save_model(path)?;
            }

            let output = ForecastOutput {
                forecast: forecaster.predict(*days)?,
                trend_analysis: forecaster.trend_analysis()?,
            };
            print_json(&output, cli.pretty)
        }

        Command::Optimize { input } => {
            let inventory: ResourceInventory = read_json(input)?;
            let report = config.optimizer()?.generate_report(&inventory);
            print_json(&report, cli.pretty)
        }

        Command::Budget { current, budget } => {
            if !current.is_finite() || *current < 0.0 || !budget.is_finite() || *budget < 0.0 {
                bail!("--current and --budget must be non-negative amounts");
            }
            let result = config.optimizer()?.optimize_for_budget(*current, *budget);
            print_json(&result, cli.pretty)
        }
    }
}
