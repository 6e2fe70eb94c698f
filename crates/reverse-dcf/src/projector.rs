use serde::{Deserialize, Serialize};
use valuation_core::{PeriodLabel, ValuationError, ValuationInput, YearlyRow};

/// Which growth phase a projected period belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Stage 1, growing at the rate being solved for.
    Growth,
    /// Stage 2, the fixed-growth bridge to the terminal value.
    Bridge,
}

/// One explicit forecast period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPeriod {
    pub year: u32,
    pub stage: Stage,
    pub growth_rate: f64,
    pub projected_fcf: f64,
    pub discounted_pv: f64,
}

/// Discounted sums of a two-stage projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub pv_stage1: f64,
    pub pv_stage2: f64,
    pub pv_terminal: f64,
    /// Undiscounted perpetuity value at the end of the horizon.
    pub terminal_value: f64,
    /// FCF of the last explicit period, the base of the perpetuity.
    pub last_stage2_fcf: f64,
}

impl Projection {
    pub fn total_present_value(&self) -> f64 {
        self.pv_stage1 + self.pv_stage2 + self.pv_terminal
    }
}

/// Two-stage FCF projection with a perpetuity-growth terminal value.
///
/// Explicit-period sums and breakdown rows both come from `periods`, so the
/// displayed breakdown always matches the value the solver saw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashFlowProjector {
    base_fcf: f64,
    discount_rate: f64,
    stage1_years: u32,
    stage2_years: u32,
    stage2_growth: f64,
    terminal_growth: f64,
}

impl CashFlowProjector {
    pub fn new(input: &ValuationInput) -> Result<Self, ValuationError> {
        if !(input.discount_rate > input.terminal_growth) {
            return Err(ValuationError::DegenerateModelParameters(format!(
                "discount rate {:.2}% must exceed terminal growth {:.2}%",
                input.discount_rate * 100.0,
                input.terminal_growth * 100.0
            )));
        }
        Ok(Self {
            base_fcf: input.base_fcf,
            discount_rate: input.discount_rate,
            stage1_years: input.stage1_years,
            stage2_years: input.stage2_years,
            stage2_growth: input.stage2_growth,
            terminal_growth: input.terminal_growth,
        })
    }

    pub fn horizon(&self) -> u32 {
        self.stage1_years + self.stage2_years
    }

    /// FCF at the end of stage 1; stage 2 compounds from here.
    fn anchor(&self, stage1_growth: f64) -> f64 {
        self.base_fcf * (1.0 + stage1_growth).powi(self.stage1_years as i32)
    }

    fn discount_factor(&self, year: u32) -> f64 {
        (1.0 + self.discount_rate).powi(year as i32)
    }

    /// Projected and discounted FCF for years `1..=stage1_years + stage2_years`.
    pub fn periods(&self, stage1_growth: f64) -> impl Iterator<Item = ProjectedPeriod> + '_ {
        let anchor = self.anchor(stage1_growth);
        (1..=self.horizon()).map(move |year| {
            let (stage, growth_rate, projected_fcf) = if year <= self.stage1_years {
                (
                    Stage::Growth,
                    stage1_growth,
                    self.base_fcf * (1.0 + stage1_growth).powi(year as i32),
                )
            } else {
                (
                    Stage::Bridge,
                    self.stage2_growth,
                    anchor * (1.0 + self.stage2_growth).powi((year - self.stage1_years) as i32),
                )
            };
            ProjectedPeriod {
                year,
                stage,
                growth_rate,
                projected_fcf,
                discounted_pv: projected_fcf / self.discount_factor(year),
            }
        })
    }

    pub fn project(&self, stage1_growth: f64) -> Projection {
        let (pv_stage1, pv_stage2) =
            self.periods(stage1_growth)
                .fold((0.0, 0.0), |(s1, s2), period| match period.stage {
                    Stage::Growth => (s1 + period.discounted_pv, s2),
                    Stage::Bridge => (s1, s2 + period.discounted_pv),
                });

        let last_stage2_fcf =
            self.anchor(stage1_growth) * (1.0 + self.stage2_growth).powi(self.stage2_years as i32);
        let terminal_value = last_stage2_fcf * (1.0 + self.terminal_growth)
            / (self.discount_rate - self.terminal_growth);
        let pv_terminal = terminal_value / self.discount_factor(self.horizon());

        Projection {
            pv_stage1,
            pv_stage2,
            pv_terminal,
            terminal_value,
            last_stage2_fcf,
        }
    }

    /// Per-year rows followed by one synthetic terminal row.
    pub fn breakdown(&self, stage1_growth: f64) -> Vec<YearlyRow> {
        let mut rows: Vec<YearlyRow> = self
            .periods(stage1_growth)
            .map(|p| YearlyRow {
                period: PeriodLabel::Year(p.year),
                growth_rate: p.growth_rate,
                projected_fcf: p.projected_fcf,
                discounted_pv: p.discounted_pv,
            })
            .collect();

        let projection = self.project(stage1_growth);
        rows.push(YearlyRow {
            period: PeriodLabel::Terminal,
            growth_rate: self.terminal_growth,
            projected_fcf: projection.terminal_value,
            discounted_pv: projection.pv_terminal,
        });
        rows
    }
}

/// Project `input` at `stage1_growth` in one call.
pub fn project(input: &ValuationInput, stage1_growth: f64) -> Result<Projection, ValuationError> {
    let projection = CashFlowProjector::new(input)?.project(stage1_growth);
    if !projection.total_present_value().is_finite() {
        return Err(ValuationError::DegenerateModelParameters(
            "projection diverged".to_string(),
        ));
    }
    Ok(projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn input(stage1_years: u32, stage2_years: u32) -> ValuationInput {
        ValuationInput {
            base_fcf: 100.0,
            market_price: 1.0,
            shares_outstanding: 1000.0,
            discount_rate: 0.10,
            stage1_years,
            stage2_years,
            stage2_growth: 0.05,
            terminal_growth: 0.025,
        }
    }

    #[test]
    fn test_flat_single_stage() {
        let projection = project(&input(5, 0), 0.0).unwrap();

        // Annuity of 100 for 5 years at 10%
        assert_relative_eq!(projection.pv_stage1, 379.078_676_940_844_7, epsilon = 1e-9);
        assert_eq!(projection.pv_stage2, 0.0);
        // 100 * 1.025 / 0.075
        assert_relative_eq!(projection.terminal_value, 1366.666_666_666_666_5, epsilon = 1e-9);
        assert_relative_eq!(projection.pv_terminal, 848.592_474_847_511_7, epsilon = 1e-9);
        assert_relative_eq!(projection.last_stage2_fcf, 100.0);
    }

    #[test]
    fn test_two_stage_chains_anchor() {
        let projection = project(&input(5, 5), 0.10).unwrap();

        // Growth equals the discount rate, so every stage-1 PV is exactly 100
        assert_relative_eq!(projection.pv_stage1, 500.0, epsilon = 1e-9);
        assert_relative_eq!(projection.pv_stage2, 435.812_083_594_637_7, epsilon = 1e-9);
        assert_relative_eq!(projection.last_stage2_fcf, 205.546_421_922_187_6, epsilon = 1e-9);
        assert_relative_eq!(projection.terminal_value, 2809.134_432_936_563, epsilon = 1e-6);
        assert_relative_eq!(projection.pv_terminal, 1083.042_929_724_124, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_stage1_years_starts_bridge_from_base() {
        let projector = CashFlowProjector::new(&input(0, 3)).unwrap();
        let periods: Vec<_> = projector.periods(0.40).collect();

        assert_eq!(periods.len(), 3);
        assert!(periods.iter().all(|p| p.stage == Stage::Bridge));
        assert_relative_eq!(periods[0].projected_fcf, 105.0);
        assert_eq!(projector.project(0.40).pv_stage1, 0.0);
    }

    #[test]
    fn test_empty_horizon_is_pure_perpetuity() {
        let projection = project(&input(0, 0), 0.2).unwrap();
        assert_eq!(projection.pv_stage1 + projection.pv_stage2, 0.0);
        assert_relative_eq!(projection.pv_terminal, 100.0 * 1.025 / 0.075, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_terminal() {
        let degenerate = ValuationInput {
            discount_rate: 0.02,
            ..input(5, 0)
        };
        assert!(matches!(
            project(&degenerate, 0.0),
            Err(ValuationError::DegenerateModelParameters(_))
        ));
    }

    #[test]
    fn test_breakdown_matches_projection() {
        let projector = CashFlowProjector::new(&input(3, 2)).unwrap();
        let rows = projector.breakdown(0.12);
        let projection = projector.project(0.12);

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].period, PeriodLabel::Year(1));
        assert_eq!(rows[5].period, PeriodLabel::Terminal);
        assert_relative_eq!(rows[3].growth_rate, 0.05);

        let explicit: f64 = rows[..5].iter().map(|r| r.discounted_pv).sum();
        assert_relative_eq!(explicit, projection.pv_stage1 + projection.pv_stage2, epsilon = 1e-9);
        assert_relative_eq!(rows[5].discounted_pv, projection.pv_terminal);
        assert_relative_eq!(rows[5].projected_fcf, projection.terminal_value);
    }
}
