use serde::{Deserialize, Serialize};

use crate::error::ValuationError;

/// How stage-2 growth is specified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage2Growth {
    /// Fixed annual rate.
    Absolute(f64),
    /// Fraction of the solved stage-1 rate.
    RelativeToStage1 { ratio: f64 },
}

impl Stage2Growth {
    /// Rate assumed for stage 2 before the stage-1 rate is known.
    pub const PLACEHOLDER: f64 = 0.05;
}

impl Default for Stage2Growth {
    fn default() -> Self {
        Stage2Growth::Absolute(Stage2Growth::PLACEHOLDER)
    }
}

/// Fixed-point policy for relative stage-2 mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeStrategy {
    /// Solve with the placeholder, derive stage-2 growth, solve once more.
    OneCorrection,
    /// Keep correcting until two successive solutions agree.
    Converge { max_passes: u32, tolerance: f64 },
}

impl Default for RelativeStrategy {
    fn default() -> Self {
        RelativeStrategy::OneCorrection
    }
}

/// Bisection search settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub iterations: u32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            lower_bound: -0.50,
            upper_bound: 1.00,
            iterations: 60,
        }
    }
}

impl SolverSettings {
    /// Accepted bisection iteration counts. Fewer leaves the bracket wider
    /// than the 4 dp reporting precision; more only burns time.
    pub const ITERATION_RANGE: std::ops::RangeInclusive<u32> = 50..=100;

    /// Width of the final bracketing interval.
    pub fn tolerance(&self) -> f64 {
        (self.upper_bound - self.lower_bound) / 2f64.powi(self.iterations as i32)
    }
}

/// Model configuration shared by every security in a run.
///
/// Passed by value into each computation; nothing mutates it after
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub discount_rate: f64,
    pub stage1_years: u32,
    pub stage2_years: u32,
    pub stage2_growth: Stage2Growth,
    pub terminal_growth: f64,
    #[serde(default)]
    pub relative_strategy: RelativeStrategy,
    #[serde(default)]
    pub solver: SolverSettings,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            discount_rate: 0.10,
            stage1_years: 5,
            stage2_years: 5,
            stage2_growth: Stage2Growth::default(),
            terminal_growth: 0.025,
            relative_strategy: RelativeStrategy::default(),
            solver: SolverSettings::default(),
        }
    }
}

impl ModelParams {
    /// Stage-2 rate to seed a `ValuationInput` with.
    ///
    /// In relative mode this is the placeholder, unless the placeholder would
    /// itself be degenerate, in which case the terminal rate stands in.
    pub fn initial_stage2_growth(&self) -> f64 {
        match self.stage2_growth {
            Stage2Growth::Absolute(rate) => rate,
            Stage2Growth::RelativeToStage1 { .. } => {
                if Stage2Growth::PLACEHOLDER < self.discount_rate {
                    Stage2Growth::PLACEHOLDER
                } else {
                    self.terminal_growth
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ValuationError> {
        if !self.discount_rate.is_finite() || self.discount_rate <= 0.0 || self.discount_rate >= 1.0 {
            return Err(ValuationError::InvalidParameter(format!(
                "discount rate must be in (0, 1), got {}",
                self.discount_rate
            )));
        }
        if !self.terminal_growth.is_finite() {
            return Err(ValuationError::InvalidParameter(
                "terminal growth must be finite".to_string(),
            ));
        }
        if self.discount_rate <= self.terminal_growth {
            return Err(ValuationError::DegenerateModelParameters(format!(
                "discount rate {:.2}% must exceed terminal growth {:.2}%",
                self.discount_rate * 100.0,
                self.terminal_growth * 100.0
            )));
        }
        match self.stage2_growth {
            Stage2Growth::Absolute(rate) => {
                if !rate.is_finite() {
                    return Err(ValuationError::InvalidParameter(
                        "stage-2 growth must be finite".to_string(),
                    ));
                }
                if self.stage2_years > 0 && self.discount_rate <= rate {
                    return Err(ValuationError::DegenerateModelParameters(format!(
                        "discount rate {:.2}% must exceed stage-2 growth {:.2}%",
                        self.discount_rate * 100.0,
                        rate * 100.0
                    )));
                }
            }
            Stage2Growth::RelativeToStage1 { ratio } => {
                if !ratio.is_finite() {
                    return Err(ValuationError::InvalidParameter(
                        "stage-2 ratio must be finite".to_string(),
                    ));
                }
            }
        }
        if let RelativeStrategy::Converge { max_passes, tolerance } = self.relative_strategy {
            if max_passes == 0 || !(tolerance > 0.0) {
                return Err(ValuationError::InvalidParameter(
                    "converge strategy needs max_passes >= 1 and a positive tolerance".to_string(),
                ));
            }
        }

        let solver = &self.solver;
        if !SolverSettings::ITERATION_RANGE.contains(&solver.iterations) {
            return Err(ValuationError::InvalidParameter(format!(
                "solver iterations must be between {} and {}, got {}",
                SolverSettings::ITERATION_RANGE.start(),
                SolverSettings::ITERATION_RANGE.end(),
                solver.iterations
            )));
        }
        if !(solver.lower_bound > -1.0 && solver.lower_bound < solver.upper_bound)
            || !solver.upper_bound.is_finite()
        {
            return Err(ValuationError::InvalidParameter(format!(
                "search interval [{}, {}] is not usable",
                solver.lower_bound, solver.upper_bound
            )));
        }
        Ok(())
    }

    /// Defaults overlaid with `DCF_*` environment variables.
    pub fn from_env() -> Result<Self, ValuationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each `DCF_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValuationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let rate = |key: &str, default: f64| -> Result<f64, ValuationError> {
            match var(key) {
                Some(raw) => parse_rate(&raw).ok_or_else(|| {
                    ValuationError::InvalidParameter(format!("{}={} is not a rate", key, raw))
                }),
                None => Ok(default),
            }
        };
        let count = |key: &str, default: u32| -> Result<u32, ValuationError> {
            match var(key) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    ValuationError::InvalidParameter(format!("{}={} is not a count", key, raw))
                }),
                None => Ok(default),
            }
        };

        let stage2_growth = if var("DCF_STAGE2_RATIO").is_some() {
            Stage2Growth::RelativeToStage1 {
                ratio: rate("DCF_STAGE2_RATIO", 0.0)?,
            }
        } else {
            Stage2Growth::Absolute(rate("DCF_STAGE2_GROWTH", Stage2Growth::PLACEHOLDER)?)
        };

        let converge = match var("DCF_RELATIVE_CONVERGE") {
            Some(raw) => raw.trim().parse::<bool>().map_err(|_| {
                ValuationError::InvalidParameter(format!("DCF_RELATIVE_CONVERGE={} is not a bool", raw))
            })?,
            None => false,
        };
        let relative_strategy = if converge {
            RelativeStrategy::Converge {
                max_passes: 25,
                tolerance: 1e-4,
            }
        } else {
            RelativeStrategy::OneCorrection
        };

        let params = Self {
            discount_rate: rate("DCF_DISCOUNT_RATE", defaults.discount_rate)?,
            stage1_years: count("DCF_STAGE1_YEARS", defaults.stage1_years)?,
            stage2_years: count("DCF_STAGE2_YEARS", defaults.stage2_years)?,
            stage2_growth,
            terminal_growth: rate("DCF_TERMINAL_GROWTH", defaults.terminal_growth)?,
            relative_strategy,
            solver: SolverSettings {
                iterations: count("DCF_SOLVER_ITERATIONS", defaults.solver.iterations)?,
                ..defaults.solver
            },
        };

        params.validate()?;
        Ok(params)
    }
}

/// Parse a rate written as a decimal (`0.1`), a percentage (`10%`) or a bare
/// percentage figure (`10`). Without a `%`, magnitudes up to 1 are decimals
/// (`1` is 100%) and anything above 1 is a percentage (`1.5` is 1.5%).
pub fn parse_rate(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let value = match trimmed.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().ok()? / 100.0,
        None => {
            let v = trimmed.parse::<f64>().ok()?;
            if v.abs() > 1.0 {
                v / 100.0
            } else {
                v
            }
        }
    };
    value.is_finite().then_some(value)
}
