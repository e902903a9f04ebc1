//! QuantSys CLI — run a full system or inspect a single rule's forecast.
//!
//! Commands:
//! - `run` — build the six-stage pipeline from a TOML config and report
//!   positions and the portfolio account curve
//! - `forecast` — evaluate one trading rule for one instrument and print
//!   the scalar and capped forecast tail

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quantsys_core::config::Config;
use quantsys_core::data::{CsvDataProvider, DataProvider, SyntheticDataProvider};
use quantsys_core::domain::InstrumentCode;
use quantsys_core::stages::{
    Account, ForecastCombineEstimated, ForecastCombineFixed, ForecastScaleCapEstimated,
    ForecastScaleCapFixed, PortfoliosEstimated, PortfoliosFixed, PositionSizing, Rules, Stage,
};
use quantsys_core::system::System;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "quantsys",
    about = "QuantSys CLI — systematic trading pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the full pipeline from a TOML config and report positions and
    /// the portfolio account curve.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Data directory (instruments.csv plus per-instrument price files).
        #[arg(long)]
        data: Option<PathBuf>,

        /// Use seeded synthetic prices instead of a data directory.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Instruments to report on (and, with --synthetic, the universe
        /// to simulate). Default: everything the provider serves.
        #[arg(long)]
        instruments: Vec<String>,

        /// Master seed for synthetic prices.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Trading days of synthetic history.
        #[arg(long, default_value_t = 1000)]
        days: usize,

        /// Rows of each position series to print.
        #[arg(long, default_value_t = 5)]
        tail: usize,
    },
    /// Evaluate one trading rule for one instrument.
    Forecast {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Data directory (instruments.csv plus per-instrument price files).
        #[arg(long)]
        data: Option<PathBuf>,

        /// Use seeded synthetic prices instead of a data directory.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Master seed for synthetic prices.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Trading days of synthetic history.
        #[arg(long, default_value_t = 1000)]
        days: usize,

        /// Instrument code.
        #[arg(long)]
        instrument: String,

        /// Rule name, as declared under [trading_rules] in the config.
        #[arg(long)]
        rule: String,

        /// Rows of the capped forecast to print.
        #[arg(long, default_value_t = 10)]
        tail: usize,
    },
}

/// The `[system]` section of the config file. The core config parser skips
/// it (unknown keys are ignored), so the CLI reads it separately.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SystemOptions {
    estimate_forecast_scalars: bool,
    estimate_forecast_weights: bool,
    estimate_instrument_weights: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CliDocument {
    system: SystemOptions,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            data,
            synthetic,
            instruments,
            seed,
            days,
            tail,
        } => run_system(config, data, synthetic, instruments, seed, days, tail),
        Commands::Forecast {
            config,
            data,
            synthetic,
            seed,
            days,
            instrument,
            rule,
            tail,
        } => run_forecast(config, data, synthetic, seed, days, &instrument, &rule, tail),
    }
}

fn load_config(path: &PathBuf) -> Result<(Config, SystemOptions)> {
    let doc = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = Config::from_toml_str(&doc)?;
    let options: CliDocument =
        toml::from_str(&doc).with_context(|| format!("parsing [system] in {}", path.display()))?;
    Ok((config, options.system))
}

fn build_provider(
    data: Option<PathBuf>,
    synthetic: bool,
    instruments: &[String],
    seed: u64,
    days: usize,
) -> Result<Arc<dyn DataProvider>> {
    if synthetic {
        if instruments.is_empty() {
            bail!("--synthetic requires --instruments");
        }
        let codes: Vec<InstrumentCode> = instruments.iter().map(|s| s.as_str().into()).collect();
        info!(instruments = codes.len(), seed, days, "using synthetic prices");
        return Ok(Arc::new(SyntheticDataProvider::new(codes, seed, days)));
    }
    match data {
        Some(dir) => Ok(Arc::new(CsvDataProvider::load(dir)?)),
        None => bail!("one of --data or --synthetic is required"),
    }
}

/// Assemble the standard six-stage pipeline, choosing fixed or estimated
/// variants per the `[system]` options. Rules come from `[trading_rules]`
/// in the config.
fn build_stages(options: &SystemOptions) -> Vec<Box<dyn Stage>> {
    let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(Rules::empty())];

    if options.estimate_forecast_scalars {
        stages.push(Box::new(ForecastScaleCapEstimated));
    } else {
        stages.push(Box::new(ForecastScaleCapFixed));
    }
    if options.estimate_forecast_weights {
        stages.push(Box::new(ForecastCombineEstimated));
    } else {
        stages.push(Box::new(ForecastCombineFixed));
    }
    stages.push(Box::new(PositionSizing));
    if options.estimate_instrument_weights {
        stages.push(Box::new(PortfoliosEstimated));
    } else {
        stages.push(Box::new(PortfoliosFixed));
    }
    stages.push(Box::new(Account));
    stages
}

#[allow(clippy::too_many_arguments)]
fn run_system(
    config_path: PathBuf,
    data: Option<PathBuf>,
    synthetic: bool,
    instruments: Vec<String>,
    seed: u64,
    days: usize,
    tail: usize,
) -> Result<()> {
    let (config, options) = load_config(&config_path)?;
    let provider = build_provider(data, synthetic, &instruments, seed, days)?;
    let sys = System::new(build_stages(&options), provider, config)?;
    info!(config = %sys.config_hash(), stages = sys.stage_names().len(), "system built");

    println!("Stages: {}", sys.stage_names().join(", "));
    println!("Config: {}", sys.config_hash());
    println!();

    let report: Vec<InstrumentCode> = if instruments.is_empty() {
        sys.data().instruments()
    } else {
        instruments.iter().map(|s| s.as_str().into()).collect()
    };
    for code in report {
        let position = sys.notional_position(&code)?;
        println!("--- {code} (notional position, last {tail}) ---");
        for (date, value) in position.tail(tail) {
            println!("  {date}  {value:>10.2}");
        }
    }

    let curve = sys.portfolio_curve()?;
    println!();
    println!("=== Portfolio ===");
    println!("Days:           {}", curve.pnl.len());
    println!("Ann. mean:      {:>12.2}", curve.stats.ann_mean);
    println!("Ann. std:       {:>12.2}", curve.stats.ann_std);
    println!("Sharpe:         {:>12.3}", curve.stats.sharpe);
    println!("Max drawdown:   {:>12.2}", curve.stats.max_drawdown);

    let stats = sys.cache_stats();
    println!();
    println!(
        "Cache: {} entries, {} hits / {} misses",
        sys.cached_entries(),
        stats.hits,
        stats.misses
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_forecast(
    config_path: PathBuf,
    data: Option<PathBuf>,
    synthetic: bool,
    seed: u64,
    days: usize,
    instrument: &str,
    rule: &str,
    tail: usize,
) -> Result<()> {
    let (config, options) = load_config(&config_path)?;
    let instruments = vec![instrument.to_string()];
    let provider = build_provider(data, synthetic, &instruments, seed, days)?;
    let sys = System::new(build_stages(&options), provider, config)?;
    info!(instrument, rule, "evaluating single forecast");

    let code: InstrumentCode = instrument.into();
    let rule_name = rule.into();

    let scalar = sys.forecast_scalar(&code, &rule_name)?;
    let capped = sys.capped_forecast(&code, &rule_name)?;

    println!("Instrument:     {code}");
    println!("Rule:           {rule_name}");
    println!("Scalar:         {scalar:.4}");
    println!("Capped forecast (last {tail}):");
    for (date, value) in capped.tail(tail) {
        println!("  {date}  {value:>8.3}");
    }
    Ok(())
}
