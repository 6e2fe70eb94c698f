use serde::{Deserialize, Serialize};
use tracing::debug;
use valuation_core::{
    FixedPointTrace, RelativeStrategy, SearchBound, SolverSettings, ValuationError, ValuationInput,
};

use crate::valuation::ValuationFunction;

/// Solved rates are reported to 4 decimal places (0.01%).
const RATE_DECIMALS: f64 = 10_000.0;

/// Round a rate to the reporting precision.
pub fn round_rate(rate: f64) -> f64 {
    (rate * RATE_DECIMALS).round() / RATE_DECIMALS
}

/// An implied growth rate, flagged when it sits on a search bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolvedGrowth {
    pub rate: f64,
    pub saturated: Option<SearchBound>,
}

/// Outcome of a relative stage-2 solve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeSolve {
    pub growth: SolvedGrowth,
    /// Stage-2 rate used in the final pass.
    pub stage2_growth: f64,
    pub trace: FixedPointTrace,
}

/// Fixed-iteration bisection over stage-1 growth.
///
/// The interval halves every iteration, so after `n` iterations the answer
/// is within `(upper - lower) / 2^n` of the true root (or of the bound it
/// saturated at). No convergence test is needed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImpliedGrowthSolver {
    settings: SolverSettings,
}

impl ImpliedGrowthSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Unrounded midpoint of the final bracket around `value(g) == target_price`.
    pub fn bisect(&self, function: &ValuationFunction, target_price: f64) -> f64 {
        let mut low = self.settings.lower_bound;
        let mut high = self.settings.upper_bound;

        for _ in 0..self.settings.iterations {
            let mid = (low + high) / 2.0;
            if function.value_per_share(mid) > target_price {
                // Model is worth more than the price: the market implies less growth
                high = mid;
            } else {
                low = mid;
            }
        }

        (low + high) / 2.0
    }

    /// Solve for the stage-1 growth that reconciles model value with
    /// `input.market_price`.
    pub fn solve(&self, input: &ValuationInput) -> Result<SolvedGrowth, ValuationError> {
        let raw = self.solve_raw(input)?;
        Ok(self.finish(raw))
    }

    fn solve_raw(&self, input: &ValuationInput) -> Result<f64, ValuationError> {
        input.validate()?;
        let function = ValuationFunction::new(input)?;
        let raw = self.bisect(&function, input.market_price);

        debug!(
            price = input.market_price,
            raw,
            iterations = self.settings.iterations,
            "Bisection finished"
        );
        Ok(raw)
    }

    /// Round and flag saturation at either bound.
    fn finish(&self, raw: f64) -> SolvedGrowth {
        let rate = round_rate(raw);
        let saturated = if rate <= round_rate(self.settings.lower_bound) {
            Some(SearchBound::Lower)
        } else if rate >= round_rate(self.settings.upper_bound) {
            Some(SearchBound::Upper)
        } else {
            None
        };
        SolvedGrowth { rate, saturated }
    }

    /// Solve with stage-2 growth tied to the stage-1 result by `ratio`.
    ///
    /// The first pass uses `input.stage2_growth` as a placeholder. With
    /// `OneCorrection` the derived rate is fed back exactly once, which is an
    /// approximation rather than a fixed point. `Converge` keeps correcting
    /// until two passes agree within `tolerance` or `max_passes` corrections
    /// have run. A derived stage-2 rate at or above the discount rate is
    /// reported as degenerate.
    pub fn solve_relative(
        &self,
        input: &ValuationInput,
        ratio: f64,
        strategy: RelativeStrategy,
    ) -> Result<RelativeSolve, ValuationError> {
        // Corrections work on unrounded rates; rounding happens once at the end
        let mut current = self.solve_raw(input)?;
        let mut stage2_growth = input.stage2_growth;
        let mut passes = 1;

        if input.stage2_years == 0 {
            return Ok(RelativeSolve {
                growth: self.finish(current),
                stage2_growth,
                trace: FixedPointTrace {
                    passes,
                    converged: true,
                },
            });
        }

        let (max_corrections, tolerance) = match strategy {
            RelativeStrategy::OneCorrection => (1, 0.5 / RATE_DECIMALS),
            RelativeStrategy::Converge { max_passes, tolerance } => (max_passes, tolerance),
        };

        let mut converged = false;
        for _ in 0..max_corrections {
            stage2_growth = ratio * current;
            let next = self.solve_raw(&input.with_stage2_growth(stage2_growth))?;
            passes += 1;

            let delta = (next - current).abs();
            current = next;
            converged = delta <= tolerance;
            if converged {
                break;
            }
        }

        debug!(ratio, stage2_growth, passes, converged, "Relative stage-2 solve finished");

        Ok(RelativeSolve {
            growth: self.finish(current),
            stage2_growth,
            trace: FixedPointTrace { passes, converged },
        })
    }
}

/// Solve with the default search interval and iteration count.
pub fn solve_implied_growth(input: &ValuationInput) -> Result<SolvedGrowth, ValuationError> {
    ImpliedGrowthSolver::default().solve(input)
}
