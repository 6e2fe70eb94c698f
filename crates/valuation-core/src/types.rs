use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ModelParams;
use crate::error::ValuationError;

/// Per-ticker fundamentals as delivered by a market-data provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub ticker: String,
    #[serde(default)]
    pub base_fcf: Option<f64>,
    #[serde(default)]
    pub market_price: Option<f64>,
    #[serde(default)]
    pub shares_outstanding: Option<f64>,
    /// Display only, never read by the engine.
    #[serde(default)]
    pub historical_growth_estimate: Option<f64>,
}

/// One line of a portfolio holding list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub portfolio: String,
    pub ticker: String,
    #[serde(default)]
    pub shares: Option<f64>,
}

/// Fully resolved inputs for a single reverse-DCF evaluation.
///
/// `stage2_growth` is always an absolute rate here. Relative stage-2 mode is
/// resolved by the solver, which rebuilds the input with the derived rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationInput {
    pub base_fcf: f64,
    pub market_price: f64,
    pub shares_outstanding: f64,
    pub discount_rate: f64,
    pub stage1_years: u32,
    pub stage2_years: u32,
    pub stage2_growth: f64,
    pub terminal_growth: f64,
}

fn positive(value: Option<f64>, field: &str, ticker: &str) -> Result<f64, ValuationError> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(v) => Err(ValuationError::MissingFundamentalData(format!(
            "{}: {} must be positive, got {}",
            ticker, field, v
        ))),
        None => Err(ValuationError::MissingFundamentalData(format!(
            "{}: {} not available",
            ticker, field
        ))),
    }
}

impl ValuationInput {
    /// Build an input from provider data and model configuration.
    /// Relative stage-2 mode starts from the placeholder rate.
    pub fn from_fundamentals(
        fundamentals: &Fundamentals,
        params: &ModelParams,
    ) -> Result<Self, ValuationError> {
        let ticker = fundamentals.ticker.as_str();
        Ok(Self {
            base_fcf: positive(fundamentals.base_fcf, "base_fcf", ticker)?,
            market_price: positive(fundamentals.market_price, "market_price", ticker)?,
            shares_outstanding: positive(
                fundamentals.shares_outstanding,
                "shares_outstanding",
                ticker,
            )?,
            discount_rate: params.discount_rate,
            stage1_years: params.stage1_years,
            stage2_years: params.stage2_years,
            stage2_growth: params.initial_stage2_growth(),
            terminal_growth: params.terminal_growth,
        })
    }

    /// Explicit forecast horizon in periods.
    pub fn horizon(&self) -> u32 {
        self.stage1_years + self.stage2_years
    }

    pub fn with_market_price(self, market_price: f64) -> Self {
        Self {
            market_price,
            ..self
        }
    }

    pub fn with_stage2_growth(self, stage2_growth: f64) -> Self {
        Self {
            stage2_growth,
            ..self
        }
    }

    /// Check that the discount rate dominates every growth rate that feeds
    /// a perpetuity or a stage the model actually uses.
    pub fn validate_parameters(&self) -> Result<(), ValuationError> {
        if !self.discount_rate.is_finite() || self.discount_rate <= 0.0 || self.discount_rate >= 1.0 {
            return Err(ValuationError::InvalidParameter(format!(
                "discount rate must be in (0, 1), got {}",
                self.discount_rate
            )));
        }
        if !self.terminal_growth.is_finite() || !self.stage2_growth.is_finite() {
            return Err(ValuationError::InvalidParameter(
                "growth rates must be finite".to_string(),
            ));
        }
        if self.discount_rate <= self.terminal_growth {
            return Err(ValuationError::DegenerateModelParameters(format!(
                "discount rate {:.2}% must exceed terminal growth {:.2}%",
                self.discount_rate * 100.0,
                self.terminal_growth * 100.0
            )));
        }
        if self.stage2_years > 0 && self.discount_rate <= self.stage2_growth {
            return Err(ValuationError::DegenerateModelParameters(format!(
                "discount rate {:.2}% must exceed stage-2 growth {:.2}%",
                self.discount_rate * 100.0,
                self.stage2_growth * 100.0
            )));
        }
        Ok(())
    }

    /// Check the solver preconditions on the per-security figures.
    pub fn validate_fundamentals(&self) -> Result<(), ValuationError> {
        for (field, value) in [
            ("base_fcf", self.base_fcf),
            ("market_price", self.market_price),
            ("shares_outstanding", self.shares_outstanding),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValuationError::MissingFundamentalData(format!(
                    "{} must be positive, got {}",
                    field, value
                )));
            }
        }
        Ok(())
    }

    /// Parameters first: a configuration problem affects every security.
    pub fn validate(&self) -> Result<(), ValuationError> {
        self.validate_parameters()?;
        self.validate_fundamentals()
    }
}

/// Qualitative plausibility of an implied growth rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RealismBucket {
    Conservative,
    Reasonable,
    Aggressive,
}

impl RealismBucket {
    pub const ALL: [RealismBucket; 3] = [
        RealismBucket::Conservative,
        RealismBucket::Reasonable,
        RealismBucket::Aggressive,
    ];

    pub fn to_label(&self) -> &'static str {
        match self {
            RealismBucket::Conservative => "Conservative",
            RealismBucket::Reasonable => "Reasonable",
            RealismBucket::Aggressive => "Aggressive",
        }
    }
}

impl fmt::Display for RealismBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_label())
    }
}

/// Edge of the solver's search interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBound {
    Lower,
    Upper,
}

/// Outcome of evaluating one security
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValuationStatus {
    Solved,
    /// The solve saturated at a search bound; likely a data anomaly.
    OutOfDomain { bound: SearchBound },
    MissingData { reason: String },
    DegenerateParameters { reason: String },
}

impl ValuationStatus {
    pub fn from_error(err: &ValuationError) -> Self {
        match err {
            ValuationError::MissingFundamentalData(reason) => ValuationStatus::MissingData {
                reason: reason.clone(),
            },
            ValuationError::DegenerateModelParameters(reason)
            | ValuationError::InvalidParameter(reason) => ValuationStatus::DegenerateParameters {
                reason: reason.clone(),
            },
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            ValuationStatus::Solved => "Solved",
            ValuationStatus::OutOfDomain { bound: SearchBound::Lower } => "Out of domain (lower bound)",
            ValuationStatus::OutOfDomain { bound: SearchBound::Upper } => "Out of domain (upper bound)",
            ValuationStatus::MissingData { .. } => "Insufficient data",
            ValuationStatus::DegenerateParameters { .. } => "Degenerate parameters",
        }
    }
}

/// Row label of a cash-flow breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodLabel {
    Year(u32),
    Terminal,
}

impl fmt::Display for PeriodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodLabel::Year(n) => write!(f, "Year {}", n),
            PeriodLabel::Terminal => f.write_str("Terminal"),
        }
    }
}

/// One line of the per-year breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearlyRow {
    pub period: PeriodLabel,
    pub growth_rate: f64,
    pub projected_fcf: f64,
    pub discounted_pv: f64,
}

/// Trace of a relative stage-2 solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedPointTrace {
    /// Total solver passes including the placeholder pass.
    pub passes: u32,
    /// Whether the last correction left the solution unchanged within tolerance.
    pub converged: bool,
}

/// Per-security valuation outcome.
///
/// Growth fields are `None` whenever the solve could not be carried out;
/// `status` says why. Undefined growth is never reported as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub ticker: String,
    pub status: ValuationStatus,
    pub implied_growth: Option<f64>,
    pub mos10_growth: Option<f64>,
    pub mos20_growth: Option<f64>,
    pub realism_bucket: Option<RealismBucket>,
    #[serde(default)]
    pub market_price: Option<f64>,
    /// Stage-2 rate actually used; differs from the configured one in relative mode.
    #[serde(default)]
    pub stage2_growth: Option<f64>,
    #[serde(default)]
    pub fixed_point: Option<FixedPointTrace>,
    #[serde(default)]
    pub historical_growth_estimate: Option<f64>,
    #[serde(default)]
    pub yearly_breakdown: Option<Vec<YearlyRow>>,
}

impl ValuationResult {
    /// Result for a security the engine could not value.
    pub fn undefined(fundamentals: &Fundamentals, err: &ValuationError) -> Self {
        Self {
            ticker: fundamentals.ticker.clone(),
            status: ValuationStatus::from_error(err),
            implied_growth: None,
            mos10_growth: None,
            mos20_growth: None,
            realism_bucket: None,
            market_price: fundamentals.market_price,
            stage2_growth: None,
            fixed_point: None,
            historical_growth_estimate: fundamentals.historical_growth_estimate,
            yearly_breakdown: None,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.implied_growth.is_some()
    }

    pub fn is_out_of_domain(&self) -> bool {
        matches!(self.status, ValuationStatus::OutOfDomain { .. })
    }
}

/// A valuation tied back to the holding it was requested for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub portfolio: String,
    #[serde(default)]
    pub shares: Option<f64>,
    pub result: ValuationResult,
}

impl HoldingValuation {
    /// Position value when both share count and price are known.
    pub fn position_value(&self) -> Option<f64> {
        match (self.shares, self.result.market_price) {
            (Some(shares), Some(price)) if shares > 0.0 && price > 0.0 => Some(shares * price),
            _ => None,
        }
    }
}

/// Distributional summary of one portfolio's valuations.
///
/// Only securities with a defined implied growth enter `ticker_count`,
/// the statistics and the bucket counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub label: String,
    pub ticker_count: usize,
    /// Holdings left out for missing data or degenerate parameters.
    pub excluded_count: usize,
    pub out_of_domain_count: usize,
    pub mean_implied_growth: Option<f64>,
    pub median_implied_growth: Option<f64>,
    pub min_implied_growth: Option<f64>,
    pub max_implied_growth: Option<f64>,
    pub std_dev_implied_growth: Option<f64>,
    /// Mean weighted by position value, when share counts are known.
    pub weighted_implied_growth: Option<f64>,
    pub mean_mos10_growth: Option<f64>,
    pub mean_mos20_growth: Option<f64>,
    pub conservative_count: usize,
    pub reasonable_count: usize,
    pub aggressive_count: usize,
}

impl PortfolioSummary {
    pub fn bucket_count(&self, bucket: RealismBucket) -> usize {
        match bucket {
            RealismBucket::Conservative => self.conservative_count,
            RealismBucket::Reasonable => self.reasonable_count,
            RealismBucket::Aggressive => self.aggressive_count,
        }
    }
}
