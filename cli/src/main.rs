//! housing-sim - run the housing credit engine from the command line
//!
//! ```text
//! housing-sim run --config baseline.json --market market_snapshot.json --months 120
//! housing-sim fingerprint --config baseline.json
//! ```
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` for per-month
//! detail.

mod clearing;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use housing_credit_core_rs::collectors::CreditLedger;
use housing_credit_core_rs::market::{MarketSnapshot, OfferBook};
use housing_credit_core_rs::{Config, MonthResult, Orchestrator};
use log::info;
use serde::Serialize;

use clearing::{ClearingStats, NaiveClearing};

#[derive(Parser)]
#[command(
    name = "housing-sim",
    version,
    about = "Run the household credit engine of a housing market model"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation against a fixed market snapshot
    Run(RunArgs),
    /// Print the SHA-256 fingerprint of a configuration
    Fingerprint {
        /// Configuration JSON; the bundled baseline when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Configuration JSON; the bundled baseline when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Market snapshot JSON
    #[arg(long)]
    market: PathBuf,

    /// Override the configured number of months
    #[arg(long)]
    months: Option<u32>,

    /// Override the configured seed
    #[arg(long)]
    seed: Option<u64>,

    /// Leave bids unmatched instead of clearing them naively
    #[arg(long)]
    no_clearing: bool,

    #[arg(long, value_enum, default_value = "summary")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One JSON object per month
    Json,
    /// A single JSON summary at the end
    Summary,
}

#[derive(Serialize)]
struct RunSummary {
    config_fingerprint: String,
    months: u32,
    final_population: usize,
    final_mortgage_rate: f64,
    outstanding_mortgages: usize,
    outstanding_principal: f64,
    loans_originated: usize,
    cash_purchases: usize,
    sales: usize,
    lettings: usize,
    new_builds: usize,
    bankruptcies: usize,
    births: usize,
    deaths: usize,
    months_macroprudential_active: u32,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Config::from_json_str(&json).with_context(|| format!("parsing config {}", path.display()))
        }
        None => Config::baseline().context("loading bundled baseline"),
    }
}

fn load_market(path: &Path) -> Result<MarketSnapshot> {
    let json =
        fs::read_to_string(path).with_context(|| format!("reading market {}", path.display()))?;
    MarketSnapshot::from_json_str(&json).with_context(|| format!("parsing market {}", path.display()))
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(months) = args.months {
        config.simulation.n_months = months;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    config.validate().context("invalid configuration after overrides")?;
    let market = load_market(&args.market)?;

    let fingerprint = config.fingerprint()?;
    let months = config.simulation.n_months;
    info!(
        "Running {} months, population {}, seed {}, config {}",
        months, config.simulation.initial_population, config.simulation.seed, fingerprint
    );

    let mut orchestrator = Orchestrator::new(config)?;
    let mut book = OfferBook::new();
    let mut ledger = CreditLedger::new();
    let mut clearing = NaiveClearing::new();
    let mut totals = ClearingStats::default();
    let mut last: Option<MonthResult> = None;
    let (mut bankruptcies, mut births, mut deaths, mut active_months) = (0, 0, 0, 0);

    for _ in 0..months {
        let result = orchestrator
            .tick(&market, &mut book)
            .with_context(|| format!("month {}", orchestrator.current_month()))?;
        if args.no_clearing {
            book.clear_bids();
        } else {
            let cleared = clearing.clear(&mut orchestrator, &result, &market, &mut book, &mut ledger)?;
            totals.sales += cleared.sales;
            totals.new_builds += cleared.new_builds;
            totals.lettings += cleared.lettings;
        }

        bankruptcies += result.bankruptcies;
        births += result.births;
        deaths += result.deceased.len();
        if result.macroprudential_active {
            active_months += 1;
        }
        if args.output == OutputFormat::Json {
            println!("{}", serde_json::to_string(&result)?);
        }
        last = Some(result);
    }

    if args.output == OutputFormat::Summary {
        let summary = RunSummary {
            config_fingerprint: fingerprint,
            months,
            final_population: orchestrator.population(),
            final_mortgage_rate: last
                .as_ref()
                .map_or(orchestrator.bank().mortgage_rate(), |r| r.mortgage_rate),
            outstanding_mortgages: orchestrator.bank().book().len(),
            outstanding_principal: orchestrator.bank().book().total_principal(),
            loans_originated: ledger.loans.len(),
            cash_purchases: ledger.cash_purchases.len(),
            sales: totals.sales,
            lettings: totals.lettings,
            new_builds: totals.new_builds,
            bankruptcies,
            births,
            deaths,
            months_macroprudential_active: active_months,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    info!("Finished at month {}", orchestrator.current_month());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Fingerprint { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", config.fingerprint()?);
            Ok(())
        }
    }
}
