//! Reverse discounted-cash-flow engine.
//!
//! Given a market price, solves for the constant stage-1 FCF growth rate a
//! two-stage DCF model needs to justify it, then re-runs the solve at
//! margin-of-safety prices and classifies the result.

pub mod engine;
pub mod projector;
pub mod sensitivity;
pub mod solver;
pub mod valuation;

#[cfg(test)]
mod tests;

pub use engine::{GrowthSolve, ReverseDcfEngine};
pub use projector::{project, CashFlowProjector, ProjectedPeriod, Projection, Stage};
pub use sensitivity::{classify_realism, margin_of_safety, yearly_breakdown, MarginOfSafety};
pub use solver::{round_rate, solve_implied_growth, ImpliedGrowthSolver, RelativeSolve, SolvedGrowth};
pub use valuation::{value_per_share, ValuationFunction};
