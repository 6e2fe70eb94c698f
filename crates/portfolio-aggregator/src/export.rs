use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use valuation_core::{HoldingValuation, ModelParams, PortfolioSummary, YearlyRow};

pub const BREAKDOWN_HEADER: [&str; 4] = ["Period", "Growth Rate", "Projected FCF", "Discounted PV"];

pub const RESULTS_HEADER: [&str; 8] = [
    "Portfolio",
    "Ticker",
    "Implied Growth",
    "MoS 10% Growth",
    "MoS 20% Growth",
    "Realism",
    "Status",
    "Historical Growth",
];

pub const SUMMARY_HEADER: [&str; 15] = [
    "Portfolio",
    "Tickers",
    "Excluded",
    "Out Of Domain",
    "Mean Growth",
    "Median Growth",
    "Min Growth",
    "Max Growth",
    "Std Dev",
    "Weighted Growth",
    "Mean MoS 10% Growth",
    "Mean MoS 20% Growth",
    "Conservative",
    "Reasonable",
    "Aggressive",
];

/// Rates to 4 dp, matching the solver's reporting precision.
fn rate_cell(rate: Option<f64>) -> String {
    rate.map(|r| format!("{:.4}", r)).unwrap_or_default()
}

fn money_cell(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// Write one ticker's projected cash flows. The terminal row is whatever
/// the breakdown ends with, so it stays last.
pub fn write_breakdown_csv<W: Write>(writer: W, rows: &[YearlyRow]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(BREAKDOWN_HEADER)?;

    for row in rows {
        csv_writer.write_record([
            row.period.to_string(),
            rate_cell(Some(row.growth_rate)),
            money_cell(row.projected_fcf),
            money_cell(row.discounted_pv),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// One row per holding. Undefined values are left empty, never zero.
pub fn write_results_csv<W: Write>(writer: W, valuations: &[HoldingValuation]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(RESULTS_HEADER)?;

    for valuation in valuations {
        let result = &valuation.result;
        csv_writer.write_record([
            valuation.portfolio.clone(),
            result.ticker.clone(),
            rate_cell(result.implied_growth),
            rate_cell(result.mos10_growth),
            rate_cell(result.mos20_growth),
            result
                .realism_bucket
                .map(|b| b.to_label().to_string())
                .unwrap_or_default(),
            result.status.to_label().to_string(),
            rate_cell(result.historical_growth_estimate),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_summary_csv<'a, W, I>(writer: W, summaries: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a PortfolioSummary>,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(SUMMARY_HEADER)?;

    for s in summaries {
        csv_writer.write_record([
            s.label.clone(),
            s.ticker_count.to_string(),
            s.excluded_count.to_string(),
            s.out_of_domain_count.to_string(),
            rate_cell(s.mean_implied_growth),
            rate_cell(s.median_implied_growth),
            rate_cell(s.min_implied_growth),
            rate_cell(s.max_implied_growth),
            rate_cell(s.std_dev_implied_growth),
            rate_cell(s.weighted_implied_growth),
            rate_cell(s.mean_mos10_growth),
            rate_cell(s.mean_mos20_growth),
            s.conservative_count.to_string(),
            s.reasonable_count.to_string(),
            s.aggressive_count.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

fn breakdown_file_name(ticker: &str) -> String {
    let safe: String = ticker
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{}_breakdown.csv", safe)
}

/// Write `<TICKER>_breakdown.csv` into `dir` for every valued ticker that
/// carries a breakdown. Tickers held in several portfolios are written once.
pub fn export_breakdowns(dir: &Path, valuations: &[HoldingValuation]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut seen = HashSet::new();
    let mut written = Vec::new();
    for valuation in valuations {
        let result = &valuation.result;
        let Some(rows) = result.yearly_breakdown.as_deref() else {
            continue;
        };
        if !seen.insert(result.ticker.as_str()) {
            continue;
        }

        let path = dir.join(breakdown_file_name(&result.ticker));
        let file = fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        write_breakdown_csv(file, rows).with_context(|| format!("writing {}", path.display()))?;
        debug!(ticker = %result.ticker, path = %path.display(), "Breakdown written");
        written.push(path);
    }

    info!(count = written.len(), dir = %dir.display(), "Exported cash-flow breakdowns");
    Ok(written)
}

/// Create `path` (and its parent directories) and hand the file to `write`.
pub fn write_to_path<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(fs::File) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write(file).with_context(|| format!("writing {}", path.display()))
}

/// Everything one run produced, in a form that serialises to a single JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub generated_at: DateTime<Utc>,
    pub params: ModelParams,
    pub results: Vec<HoldingValuation>,
    pub summaries: Vec<PortfolioSummary>,
    pub merged: PortfolioSummary,
}

impl EvaluationReport {
    pub fn new(
        params: ModelParams,
        results: Vec<HoldingValuation>,
        summaries: BTreeMap<String, PortfolioSummary>,
        merged: PortfolioSummary,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            params,
            results,
            summaries: summaries.into_values().collect(),
            merged,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        write_to_path(path, |mut file| {
            file.write_all(json.as_bytes())?;
            Ok(())
        })
    }
}
