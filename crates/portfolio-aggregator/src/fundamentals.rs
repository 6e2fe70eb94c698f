use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use valuation_core::{parse_rate, Fundamentals, FundamentalsSource};

/// Fundamentals keyed by upper-case ticker, loaded from a provider export.
#[derive(Debug, Clone, Default)]
pub struct FundamentalsTable {
    rows: HashMap<String, Fundamentals>,
}

fn column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

/// Blank or "N/A"-style cells mean the provider had no figure.
fn cell(record: &csv::StringRecord, idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| record.get(i))
        .map(|s| s.trim())
        .filter(|s| {
            !s.is_empty()
                && !matches!(
                    s.to_ascii_lowercase().as_str(),
                    "n/a" | "na" | "none" | "null" | "-"
                )
        })
}

fn number(record: &csv::StringRecord, idx: Option<usize>, field: &str, ticker: &str) -> Option<f64> {
    let raw = cell(record, idx)?;
    match raw.replace(',', "").parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            warn!(%ticker, field, value = raw, "Unparseable figure treated as missing");
            None
        }
    }
}

impl FundamentalsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fundamentals: Fundamentals) {
        self.rows
            .insert(fundamentals.ticker.to_uppercase(), fundamentals);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse fundamentals CSV.
    /// Expected columns: ticker, base_fcf, market_price, shares_outstanding,
    /// historical_growth (optional; decimal or percentage).
    pub fn parse_csv(csv_data: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_data.as_bytes());

        let headers = reader.headers()?.clone();
        let ticker_col = match column(&headers, &["ticker", "symbol"]) {
            Some(idx) => idx,
            None => bail!("fundamentals CSV needs a 'ticker' (or 'symbol') column"),
        };
        let fcf_col = column(&headers, &["base_fcf", "fcf", "free_cash_flow"]);
        let price_col = column(&headers, &["market_price", "price", "current_price"]);
        let shares_col = column(&headers, &["shares_outstanding", "shares"]);
        let growth_col = column(&headers, &["historical_growth", "historical_growth_estimate"]);

        let mut table = Self::new();
        for (line, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("fundamentals row {}", line + 2))?;
            let ticker = record.get(ticker_col).unwrap_or("").trim().to_uppercase();
            if ticker.is_empty() {
                warn!(row = line + 2, "Skipping fundamentals row without ticker");
                continue;
            }

            let historical_growth_estimate = cell(&record, growth_col).and_then(parse_rate);

            table.insert(Fundamentals {
                base_fcf: number(&record, fcf_col, "base_fcf", &ticker),
                market_price: number(&record, price_col, "market_price", &ticker),
                shares_outstanding: number(&record, shares_col, "shares_outstanding", &ticker),
                historical_growth_estimate,
                ticker,
            });
        }

        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let csv_data = std::fs::read_to_string(path)
            .with_context(|| format!("reading fundamentals file {}", path.display()))?;
        let table = Self::parse_csv(&csv_data)
            .with_context(|| format!("parsing fundamentals file {}", path.display()))?;
        info!(path = %path.display(), tickers = table.len(), "Loaded fundamentals");
        Ok(table)
    }
}

impl FundamentalsSource for FundamentalsTable {
    fn fundamentals(&self, ticker: &str) -> Option<Fundamentals> {
        self.rows.get(&ticker.to_uppercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fundamentals() {
        let csv = "ticker,base_fcf,market_price,shares_outstanding,historical_growth\n\
                   msft,\"70,000,000,000\",410.5,7430000000,12%\n\
                   ZZZ,N/A,12.0,1000,\n\
                   BAD,abc,1,1,0.04\n";

        let table = FundamentalsTable::parse_csv(csv).unwrap();
        assert_eq!(table.len(), 3);

        let msft = table.fundamentals("MSFT").unwrap();
        assert_eq!(msft.base_fcf, Some(70_000_000_000.0));
        assert_eq!(msft.market_price, Some(410.5));
        assert_eq!(msft.historical_growth_estimate, Some(0.12));

        let zzz = table.fundamentals("zzz").unwrap();
        assert_eq!(zzz.base_fcf, None);
        assert_eq!(zzz.historical_growth_estimate, None);

        assert_eq!(table.fundamentals("BAD").unwrap().base_fcf, None);
        assert!(table.fundamentals("NOPE").is_none());
    }

    #[test]
    fn test_alternate_headers() {
        let csv = "Symbol,FCF,Price,Shares\nko,9.5,60,4300\n";
        let table = FundamentalsTable::parse_csv(csv).unwrap();
        let ko = table.fundamentals("KO").unwrap();
        assert_eq!(ko.shares_outstanding, Some(4300.0));
    }

    #[test]
    fn test_missing_ticker_column_is_error() {
        assert!(FundamentalsTable::parse_csv("fcf,price\n1,2\n").is_err());
    }
}
