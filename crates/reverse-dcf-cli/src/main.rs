//! reverse-dcf: solve the FCF growth each holding's market price implies.
//!
//! Holdings come from one or more CSV files (`portfolio,ticker[,shares]`),
//! fundamentals from a single CSV keyed by ticker. Model parameters are read
//! from `DCF_*` environment variables (a `.env` file is honoured).
//!
//! Usage:
//!   cargo run -p reverse-dcf-cli -- --holdings growth.csv --fundamentals fundamentals.csv
//!   cargo run -p reverse-dcf-cli -- --holdings a.csv --holdings b.csv --fundamentals f.csv --portfolio Growth
//!   cargo run -p reverse-dcf-cli -- --holdings a.csv --fundamentals f.csv --json report.json --breakdown-dir out/

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use portfolio_aggregator::{
    aggregate_filtered, aggregate_merged, export_breakdowns, load_holdings, write_results_csv,
    write_summary_csv, write_to_path, EvaluationReport, FundamentalsTable,
};
use reverse_dcf::ReverseDcfEngine;
use tracing::{error, info, warn};
use valuation_core::{HoldingValuation, ModelParams, PortfolioSummary, Stage2Growth};

const DEFAULT_LOG_FILTER: &str = "reverse_dcf=info,portfolio_aggregator=info,reverse_dcf_cli=info";

/// Exit code for unusable command-line arguments.
const EXIT_USAGE: i32 = 2;
/// Exit code for invalid `DCF_*` model parameters.
const EXIT_CONFIG: i32 = 3;

const MODEL_ENV_HELP: &str = "\
Model parameters (environment):
  DCF_DISCOUNT_RATE, DCF_STAGE1_YEARS, DCF_STAGE2_YEARS, DCF_STAGE2_GROWTH,
  DCF_STAGE2_RATIO, DCF_TERMINAL_GROWTH, DCF_SOLVER_ITERATIONS (50-100), DCF_RELATIVE_CONVERGE

Rates accept 0.08, 8 or 8%. Without a %, values up to 1 are decimals
(1 means 100%) and values above 1 are percentages (1.5 means 1.5%).
";

/// Inputs and outputs chosen on the command line. Model parameters live in
/// the environment, not here.
#[derive(Debug, Clone, PartialEq, Default)]
struct RunOptions {
    holdings: Vec<PathBuf>,
    fundamentals: PathBuf,
    portfolios: Vec<String>,
    breakdown_dir: Option<PathBuf>,
    results_csv: Option<PathBuf>,
    summary_csv: Option<PathBuf>,
    json: Option<PathBuf>,
    sequential: bool,
}

/// Every value following an occurrence of `flag`.
fn values_of<'a>(args: &'a [String], flag: &str) -> Result<Vec<&'a str>> {
    let mut values = Vec::new();
    for (idx, arg) in args.iter().enumerate() {
        if arg != flag {
            continue;
        }
        match args.get(idx + 1) {
            Some(value) if !value.starts_with("--") => values.push(value.as_str()),
            _ => bail!("{} needs a value", flag),
        }
    }
    Ok(values)
}

fn value_of<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>> {
    Ok(values_of(args, flag)?.last().copied())
}

impl RunOptions {
    const KNOWN_FLAGS: [&'static str; 8] = [
        "--holdings",
        "--fundamentals",
        "--portfolio",
        "--breakdown-dir",
        "--results-csv",
        "--summary-csv",
        "--json",
        "--sequential",
    ];

    fn from_args(args: &[String]) -> Result<Self> {
        if let Some(unknown) = args
            .iter()
            .find(|a| a.starts_with("--") && !Self::KNOWN_FLAGS.contains(&a.as_str()))
        {
            bail!("unknown option {}", unknown);
        }

        let holdings: Vec<PathBuf> = values_of(args, "--holdings")?
            .into_iter()
            .map(PathBuf::from)
            .collect();
        if holdings.is_empty() {
            bail!("at least one --holdings file is required");
        }

        let fundamentals = match value_of(args, "--fundamentals")? {
            Some(path) => PathBuf::from(path),
            None => bail!("--fundamentals is required"),
        };

        Ok(Self {
            holdings,
            fundamentals,
            portfolios: values_of(args, "--portfolio")?
                .into_iter()
                .map(|s| s.trim().to_string())
                .collect(),
            breakdown_dir: value_of(args, "--breakdown-dir")?.map(PathBuf::from),
            results_csv: value_of(args, "--results-csv")?.map(PathBuf::from),
            summary_csv: value_of(args, "--summary-csv")?.map(PathBuf::from),
            json: value_of(args, "--json")?.map(PathBuf::from),
            sequential: args.iter().any(|a| a == "--sequential"),
        })
    }

    fn wants_breakdown(&self) -> bool {
        self.breakdown_dir.is_some() || self.json.is_some()
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  reverse-dcf --holdings FILE [--holdings FILE ...] --fundamentals FILE [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --portfolio LABEL      Only report this portfolio (repeatable)");
    eprintln!("  --breakdown-dir DIR    Write <TICKER>_breakdown.csv per valued ticker");
    eprintln!("  --results-csv FILE     Write per-holding results");
    eprintln!("  --summary-csv FILE     Write per-portfolio summaries");
    eprintln!("  --json FILE            Write the full evaluation report as JSON");
    eprintln!("  --sequential           Value tickers on one thread");
    eprintln!();
    eprint!("{}", MODEL_ENV_HELP);
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    // Logs go to stderr so stdout carries only the report
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter())
            .init();
    }
}

fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.2}%", r * 100.0),
        None => "n/a".to_string(),
    }
}

fn describe_params(params: &ModelParams) -> String {
    let stage2 = match params.stage2_growth {
        Stage2Growth::Absolute(g) => format_rate(Some(g)),
        Stage2Growth::RelativeToStage1 { ratio } => format!("{:.2} x stage 1", ratio),
    };
    format!(
        "discount {}, stage 1 {}y, stage 2 {}y at {}, terminal {}",
        format_rate(Some(params.discount_rate)),
        params.stage1_years,
        params.stage2_years,
        stage2,
        format_rate(Some(params.terminal_growth)),
    )
}

fn print_results(valuations: &[HoldingValuation]) {
    println!(
        "{:<16} {:<8} {:>9} {:>9} {:>9} {:>9}  {:<13} {}",
        "Portfolio", "Ticker", "Implied", "MoS 10%", "MoS 20%", "Hist.", "Realism", "Status"
    );
    for v in valuations {
        let r = &v.result;
        println!(
            "{:<16} {:<8} {:>9} {:>9} {:>9} {:>9}  {:<13} {}",
            v.portfolio,
            r.ticker,
            format_rate(r.implied_growth),
            format_rate(r.mos10_growth),
            format_rate(r.mos20_growth),
            format_rate(r.historical_growth_estimate),
            r.realism_bucket.map(|b| b.to_label()).unwrap_or("-"),
            r.status.to_label(),
        );
    }
}

fn print_summary(summary: &PortfolioSummary) {
    println!(
        "{:<16} {:>3} valued, {:>2} excluded, {:>2} at a bound | mean {} median {} weighted {} | C/R/A {}/{}/{}",
        summary.label,
        summary.ticker_count,
        summary.excluded_count,
        summary.out_of_domain_count,
        format_rate(summary.mean_implied_growth),
        format_rate(summary.median_implied_growth),
        format_rate(summary.weighted_implied_growth),
        summary.conservative_count,
        summary.reasonable_count,
        summary.aggressive_count,
    );
}

fn run(options: &RunOptions, params: ModelParams) -> Result<()> {
    let mut holdings = Vec::new();
    for path in &options.holdings {
        holdings.extend(load_holdings(path)?);
    }
    let table = FundamentalsTable::load(&options.fundamentals)?;

    let engine = ReverseDcfEngine::new(params)
        .context("invalid model parameters")?
        .with_breakdown(options.wants_breakdown());
    info!(params = %describe_params(engine.params()), "Model configured");

    let valuations = engine.evaluate_holdings(&holdings, &table, !options.sequential);

    for label in &options.portfolios {
        if !valuations.iter().any(|v| &v.portfolio == label) {
            warn!(portfolio = %label, "Requested portfolio has no holdings");
        }
    }

    let summaries = aggregate_filtered(&valuations, &options.portfolios);
    let selected: Vec<HoldingValuation> = valuations
        .into_iter()
        .filter(|v| summaries.contains_key(&v.portfolio))
        .collect();
    let merged = aggregate_merged(&selected);

    print_results(&selected);
    println!();
    for summary in summaries.values() {
        print_summary(summary);
    }
    print_summary(&merged);

    if let Some(dir) = &options.breakdown_dir {
        export_breakdowns(dir, &selected)?;
    }
    if let Some(path) = &options.results_csv {
        write_to_path(path, |file| write_results_csv(file, &selected))?;
        info!(path = %path.display(), "Results written");
    }
    if let Some(path) = &options.summary_csv {
        write_to_path(path, |file| {
            write_summary_csv(file, summaries.values().chain(std::iter::once(&merged)))
        })?;
        info!(path = %path.display(), "Summaries written");
    }
    if let Some(path) = &options.json {
        EvaluationReport::new(*engine.params(), selected, summaries, merged).write_json(path)?;
        info!(path = %path.display(), "Report written");
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let options = match RunOptions::from_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("error: {:#}", e);
            print_usage();
            std::process::exit(EXIT_USAGE);
        }
    };

    let params = match ModelParams::from_env() {
        Ok(params) => params,
        Err(e) => {
            error!(error = %e, "Invalid model configuration");
            eprintln!("configuration error: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    run(&options, params)
}
