use serde::{Deserialize, Serialize};
use valuation_core::{RealismBucket, ValuationError, ValuationInput, YearlyRow};

use crate::projector::CashFlowProjector;
use crate::solver::SolvedGrowth;

/// Price multipliers for the 10% and 20% margin-of-safety scenarios.
pub const MOS_10_PRICE_FACTOR: f64 = 0.90;
pub const MOS_20_PRICE_FACTOR: f64 = 0.80;

const CONSERVATIVE_CEILING: f64 = 0.05;
const REASONABLE_CEILING: f64 = 0.15;

/// Implied growth at discounted prices
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarginOfSafety {
    pub mos10_growth: Option<f64>,
    pub mos20_growth: Option<f64>,
}

/// Re-run `solve` at 90% and 80% of `market_price`.
///
/// `solve` is whatever solve produced the base rate (absolute or relative
/// stage 2), so the scenarios differ from the base only in price. A failed
/// scenario is reported as `None`.
pub fn margin_of_safety<F>(market_price: f64, solve: F) -> MarginOfSafety
where
    F: Fn(f64) -> Result<SolvedGrowth, ValuationError>,
{
    let at = |factor: f64| solve(market_price * factor).ok().map(|g| g.rate);
    MarginOfSafety {
        mos10_growth: at(MOS_10_PRICE_FACTOR),
        mos20_growth: at(MOS_20_PRICE_FACTOR),
    }
}

/// Bucket an implied growth rate. Lower edges are inclusive:
/// 0.05 is Reasonable, 0.15 is Aggressive.
pub fn classify_realism(implied_growth: f64) -> RealismBucket {
    if implied_growth < CONSERVATIVE_CEILING {
        RealismBucket::Conservative
    } else if implied_growth < REASONABLE_CEILING {
        RealismBucket::Reasonable
    } else {
        RealismBucket::Aggressive
    }
}

/// Per-year breakdown at the solved growth rate, ending in a terminal row.
pub fn yearly_breakdown(
    input: &ValuationInput,
    implied_growth: f64,
) -> Result<Vec<YearlyRow>, ValuationError> {
    Ok(CashFlowProjector::new(input)?.breakdown(implied_growth))
}
