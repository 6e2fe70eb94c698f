use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use valuation_core::Holding;

/// Column positions resolved from a holdings header row.
struct HoldingColumns {
    portfolio: Option<usize>,
    ticker: usize,
    shares: Option<usize>,
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

impl HoldingColumns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let ticker = match find_column(headers, &["ticker", "symbol"]) {
            Some(idx) => idx,
            None => bail!("holdings CSV needs a 'ticker' (or 'symbol') column"),
        };
        Ok(Self {
            portfolio: find_column(headers, &["portfolio", "portfolio_label", "label"]),
            ticker,
            shares: find_column(headers, &["shares", "share_count", "quantity"]),
        })
    }
}

/// Parse a holdings list.
/// Expected columns: ticker, portfolio (optional), shares (optional).
/// Rows without a portfolio take `default_label`; rows without a ticker are skipped.
pub fn parse_holdings_csv(csv_data: &str, default_label: &str) -> Result<Vec<Holding>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let columns = HoldingColumns::resolve(reader.headers()?)?;

    let mut holdings = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("holdings row {}", line + 2))?;

        let ticker = record.get(columns.ticker).unwrap_or("").trim().to_uppercase();
        if ticker.is_empty() {
            warn!(row = line + 2, "Skipping holding without ticker");
            continue;
        }

        let portfolio = columns
            .portfolio
            .and_then(|idx| record.get(idx))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(default_label)
            .to_string();

        let shares = columns
            .shares
            .and_then(|idx| record.get(idx))
            .map(|s| s.trim().replace(',', ""))
            .filter(|s| !s.is_empty())
            .and_then(|s| match s.parse::<f64>() {
                Ok(v) if v > 0.0 => Some(v),
                _ => {
                    warn!(row = line + 2, %ticker, value = %s, "Ignoring unusable share count");
                    None
                }
            });

        holdings.push(Holding {
            portfolio,
            ticker,
            shares,
        });
    }

    Ok(holdings)
}

/// Load a holdings file; its stem labels rows that name no portfolio.
pub fn load_holdings(path: &Path) -> Result<Vec<Holding>> {
    let csv_data = std::fs::read_to_string(path)
        .with_context(|| format!("reading holdings file {}", path.display()))?;
    let default_label = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Portfolio");

    let holdings = parse_holdings_csv(&csv_data, default_label)
        .with_context(|| format!("parsing holdings file {}", path.display()))?;
    info!(path = %path.display(), count = holdings.len(), "Loaded holdings");
    Ok(holdings)
}
