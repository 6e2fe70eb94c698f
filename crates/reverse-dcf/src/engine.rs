use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use valuation_core::{
    FixedPointTrace, Fundamentals, FundamentalsSource, Holding, HoldingValuation, ModelParams,
    Stage2Growth, ValuationError, ValuationInput, ValuationResult, ValuationStatus,
};

use crate::sensitivity::{classify_realism, margin_of_safety, yearly_breakdown};
use crate::solver::{ImpliedGrowthSolver, SolvedGrowth};

/// Base solve under the configured stage-2 mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthSolve {
    pub growth: SolvedGrowth,
    pub stage2_growth: f64,
    /// Present only in relative stage-2 mode.
    pub fixed_point: Option<FixedPointTrace>,
}

/// Runs the full per-security pipeline: solve, margin-of-safety scenarios,
/// classification and breakdown. Stateless apart from its configuration,
/// so one engine can value any number of securities concurrently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverseDcfEngine {
    params: ModelParams,
    solver: ImpliedGrowthSolver,
    include_breakdown: bool,
}

impl ReverseDcfEngine {
    /// Fails with `DegenerateModelParameters` / `InvalidParameter` before any
    /// security is touched.
    pub fn new(params: ModelParams) -> Result<Self, ValuationError> {
        params.validate()?;
        Ok(Self {
            params,
            solver: ImpliedGrowthSolver::new(params.solver),
            include_breakdown: true,
        })
    }

    pub fn with_breakdown(self, include_breakdown: bool) -> Self {
        Self {
            include_breakdown,
            ..self
        }
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Implied growth for `input` under the configured stage-2 mode.
    pub fn solve(&self, input: &ValuationInput) -> Result<GrowthSolve, ValuationError> {
        match self.params.stage2_growth {
            Stage2Growth::Absolute(_) => Ok(GrowthSolve {
                growth: self.solver.solve(input)?,
                stage2_growth: input.stage2_growth,
                fixed_point: None,
            }),
            Stage2Growth::RelativeToStage1 { ratio } => {
                let relative =
                    self.solver
                        .solve_relative(input, ratio, self.params.relative_strategy)?;
                Ok(GrowthSolve {
                    growth: relative.growth,
                    stage2_growth: relative.stage2_growth,
                    fixed_point: Some(relative.trace),
                })
            }
        }
    }

    /// Value one security. Never fails: problems end up in `status`.
    pub fn evaluate(&self, fundamentals: &Fundamentals) -> ValuationResult {
        match self.try_evaluate(fundamentals) {
            Ok(result) => result,
            Err(err) => {
                if err.is_data_problem() {
                    warn!(ticker = %fundamentals.ticker, reason = %err, "Insufficient data, security excluded");
                } else {
                    warn!(ticker = %fundamentals.ticker, reason = %err, "Model parameters unusable for security");
                }
                ValuationResult::undefined(fundamentals, &err)
            }
        }
    }

    fn try_evaluate(&self, fundamentals: &Fundamentals) -> Result<ValuationResult, ValuationError> {
        let input = ValuationInput::from_fundamentals(fundamentals, &self.params)?;
        let base = self.solve(&input)?;

        let mos = margin_of_safety(input.market_price, |price| {
            self.solve(&input.with_market_price(price)).map(|s| s.growth)
        });

        let status = match base.growth.saturated {
            Some(bound) => {
                warn!(
                    ticker = %fundamentals.ticker,
                    bound = ?bound,
                    rate = base.growth.rate,
                    "Implied growth saturated at search bound, likely a data anomaly"
                );
                ValuationStatus::OutOfDomain { bound }
            }
            None => ValuationStatus::Solved,
        };

        let yearly = if self.include_breakdown {
            Some(yearly_breakdown(
                &input.with_stage2_growth(base.stage2_growth),
                base.growth.rate,
            )?)
        } else {
            None
        };

        debug!(
            ticker = %fundamentals.ticker,
            implied = base.growth.rate,
            mos10 = ?mos.mos10_growth,
            mos20 = ?mos.mos20_growth,
            "Valued security"
        );

        Ok(ValuationResult {
            ticker: fundamentals.ticker.clone(),
            status,
            implied_growth: Some(base.growth.rate),
            mos10_growth: mos.mos10_growth,
            mos20_growth: mos.mos20_growth,
            realism_bucket: Some(classify_realism(base.growth.rate)),
            market_price: Some(input.market_price),
            stage2_growth: Some(base.stage2_growth),
            fixed_point: base.fixed_point,
            historical_growth_estimate: fundamentals.historical_growth_estimate,
            yearly_breakdown: yearly,
        })
    }

    /// Value `ticker` with whatever `source` knows about it.
    pub fn evaluate_ticker<S>(&self, source: &S, ticker: &str) -> ValuationResult
    where
        S: FundamentalsSource + ?Sized,
    {
        match source.fundamentals(ticker) {
            Some(fundamentals) => self.evaluate(&fundamentals),
            None => {
                let placeholder = Fundamentals {
                    ticker: ticker.to_string(),
                    ..Default::default()
                };
                let err = ValuationError::MissingFundamentalData(format!(
                    "{}: no fundamentals available",
                    ticker
                ));
                warn!(ticker, "No fundamentals available, security excluded");
                ValuationResult::undefined(&placeholder, &err)
            }
        }
    }

    /// Value every security in parallel. Output order matches input order.
    pub fn evaluate_batch(&self, securities: &[Fundamentals]) -> Vec<ValuationResult> {
        securities.par_iter().map(|f| self.evaluate(f)).collect()
    }

    /// Same results as `evaluate_batch`, on the calling thread.
    pub fn evaluate_batch_sequential(&self, securities: &[Fundamentals]) -> Vec<ValuationResult> {
        securities.iter().map(|f| self.evaluate(f)).collect()
    }

    /// Value each distinct ticker once and attach the result to every
    /// holding of it, across all portfolios.
    pub fn evaluate_holdings<S>(
        &self,
        holdings: &[Holding],
        source: &S,
        parallel: bool,
    ) -> Vec<HoldingValuation>
    where
        S: FundamentalsSource + Sync + ?Sized,
    {
        let tickers = distinct_tickers(holdings);

        info!(
            holdings = holdings.len(),
            tickers = tickers.len(),
            parallel,
            "Evaluating holdings"
        );

        let results: Vec<ValuationResult> = if parallel {
            tickers
                .par_iter()
                .map(|ticker| self.evaluate_ticker(source, ticker))
                .collect()
        } else {
            tickers
                .iter()
                .map(|ticker| self.evaluate_ticker(source, ticker))
                .collect()
        };

        let by_ticker: HashMap<&str, &ValuationResult> = tickers
            .iter()
            .copied()
            .zip(results.iter())
            .collect();

        holdings
            .iter()
            .filter_map(|holding| {
                by_ticker
                    .get(holding.ticker.as_str())
                    .map(|result| HoldingValuation {
                        portfolio: holding.portfolio.clone(),
                        shares: holding.shares,
                        result: (*result).clone(),
                    })
            })
            .collect()
    }
}

/// Tickers in first-seen order, each once.
fn distinct_tickers(holdings: &[Holding]) -> Vec<&str> {
    let mut seen = HashSet::new();
    holdings
        .iter()
        .map(|h| h.ticker.as_str())
        .filter(|ticker| seen.insert(*ticker))
        .collect()
}
