use valuation_core::{ValuationError, ValuationInput};

use crate::projector::CashFlowProjector;

/// Intrinsic value per share as a function of stage-1 growth, every other
/// input held fixed. Non-decreasing in growth whenever the discount rate
/// exceeds both the stage-2 and the terminal rate, which `new` enforces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuationFunction {
    projector: CashFlowProjector,
    shares_outstanding: f64,
}

impl ValuationFunction {
    pub fn new(input: &ValuationInput) -> Result<Self, ValuationError> {
        input.validate_parameters()?;
        if !input.shares_outstanding.is_finite() || input.shares_outstanding <= 0.0 {
            return Err(ValuationError::MissingFundamentalData(format!(
                "shares_outstanding must be positive, got {}",
                input.shares_outstanding
            )));
        }
        Ok(Self {
            projector: CashFlowProjector::new(input)?,
            shares_outstanding: input.shares_outstanding,
        })
    }

    pub fn projector(&self) -> &CashFlowProjector {
        &self.projector
    }

    pub fn value_per_share(&self, stage1_growth: f64) -> f64 {
        self.projector.project(stage1_growth).total_present_value() / self.shares_outstanding
    }
}

/// One-shot `value_per_share` for callers without a cached function.
pub fn value_per_share(input: &ValuationInput, stage1_growth: f64) -> Result<f64, ValuationError> {
    Ok(ValuationFunction::new(input)?.value_per_share(stage1_growth))
}
