use approx::{assert_abs_diff_eq, assert_relative_eq};
use valuation_core::{
    Fundamentals, ModelParams, RealismBucket, SolverSettings, Stage2Growth, ValuationError,
    ValuationInput, ValuationStatus,
};

use crate::engine::ReverseDcfEngine;
use crate::projector::project;
use crate::sensitivity::classify_realism;
use crate::solver::{solve_implied_growth, ImpliedGrowthSolver};
use crate::valuation::{value_per_share, ValuationFunction};

/// Helper: the single-stage worked example (FCF 100, r 10%, g_T 2.5%, 5 years, 1000 shares).
fn single_stage(market_price: f64) -> ValuationInput {
    ValuationInput {
        base_fcf: 100.0,
        market_price,
        shares_outstanding: 1000.0,
        discount_rate: 0.10,
        stage1_years: 5,
        stage2_years: 0,
        stage2_growth: 0.0,
        terminal_growth: 0.025,
    }
}

/// Helper: a two-stage input with a 5-year bridge at 4%.
fn two_stage(market_price: f64) -> ValuationInput {
    ValuationInput {
        stage2_years: 5,
        stage2_growth: 0.04,
        ..single_stage(market_price)
    }
}

fn growth_grid() -> impl Iterator<Item = f64> {
    (0..=150).map(|i| -0.5 + i as f64 * 0.01)
}

#[test]
fn test_worked_example_projection_and_recovery() {
    let projection = project(&single_stage(1.0), 0.0).unwrap();

    let annuity: f64 = (1..=5).map(|i| 100.0 / 1.1_f64.powi(i)).sum();
    let terminal = 100.0 * 1.025 / 0.075;
    assert_relative_eq!(projection.pv_stage1, annuity, epsilon = 1e-9);
    assert_relative_eq!(projection.terminal_value, terminal, epsilon = 1e-9);
    assert_relative_eq!(projection.pv_terminal, terminal / 1.1_f64.powi(5), epsilon = 1e-9);

    let price = value_per_share(&single_stage(1.0), 0.0).unwrap();
    assert_relative_eq!(price, 1.227_671_151_788_356, epsilon = 1e-12);

    let solved = solve_implied_growth(&single_stage(price)).unwrap();
    assert_abs_diff_eq!(solved.rate, 0.0, epsilon = 1e-9);
}

#[test]
fn test_value_is_monotonic_in_growth() {
    for input in [single_stage(1.0), two_stage(1.0)] {
        let function = ValuationFunction::new(&input).unwrap();
        let values: Vec<f64> = growth_grid().map(|g| function.value_per_share(g)).collect();
        assert!(
            values.windows(2).all(|w| w[1] >= w[0]),
            "value per share must not decrease with growth"
        );
    }
}

#[test]
fn test_round_trip_reproduces_price() {
    let solver = ImpliedGrowthSolver::default();
    let function = ValuationFunction::new(&two_stage(1.0)).unwrap();

    for g in [-0.35, -0.1, 0.0, 0.037, 0.12, 0.29, 0.64, 0.93] {
        let price = function.value_per_share(g);
        let raw = solver.bisect(&function, price);

        assert!((raw - g).abs() <= solver.settings().tolerance() * 4.0 + 1e-12);
        assert_relative_eq!(function.value_per_share(raw), price, max_relative = 1e-9);

        let rounded = solver.solve(&two_stage(price)).unwrap().rate;
        assert_abs_diff_eq!(rounded, g, epsilon = 0.5e-4 + 1e-12);
    }
}

#[test]
fn test_error_within_interval_width_for_any_iteration_count() {
    let function = ValuationFunction::new(&two_stage(1.0)).unwrap();
    let price = function.value_per_share(0.1234567);

    for iterations in [10, 20, 40, 60] {
        let solver = ImpliedGrowthSolver::new(SolverSettings {
            iterations,
            ..SolverSettings::default()
        });
        let error = (solver.bisect(&function, price) - 0.1234567).abs();
        assert!(error <= solver.settings().tolerance() + 1e-12);
    }
}

#[test]
fn test_margin_of_safety_ordering() {
    let engine = ReverseDcfEngine::new(ModelParams::default()).unwrap();

    for (fcf, price) in [(100.0, 0.8), (100.0, 2.0), (250.0, 9.0), (40.0, 3.5), (10.0, 60.0)] {
        let result = engine.evaluate(&Fundamentals {
            ticker: "MOS".to_string(),
            base_fcf: Some(fcf),
            market_price: Some(price),
            shares_outstanding: Some(1000.0),
            historical_growth_estimate: None,
        });

        let implied = result.implied_growth.unwrap();
        let mos10 = result.mos10_growth.unwrap();
        let mos20 = result.mos20_growth.unwrap();
        assert!(mos20 <= mos10 && mos10 <= implied, "{} {} {}", mos20, mos10, implied);
    }
}

#[test]
fn test_classification_is_total_on_solver_output() {
    for g in growth_grid() {
        let bucket = classify_realism(g);
        assert!(RealismBucket::ALL.contains(&bucket));
    }
    assert_eq!(classify_realism(0.05), RealismBucket::Reasonable);
    assert_eq!(classify_realism(0.15), RealismBucket::Aggressive);
}

#[test]
fn test_missing_fcf_is_undefined() {
    let engine = ReverseDcfEngine::new(ModelParams::default()).unwrap();
    let result = engine.evaluate(&Fundamentals {
        ticker: "NOFCF".to_string(),
        base_fcf: None,
        market_price: Some(12.0),
        shares_outstanding: Some(1000.0),
        historical_growth_estimate: None,
    });

    assert_eq!(result.implied_growth, None);
    assert!(matches!(result.status, ValuationStatus::MissingData { .. }));
}

#[test]
fn test_degenerate_discount_rate_is_not_a_growth_rate() {
    let input = ValuationInput {
        discount_rate: 0.02,
        terminal_growth: 0.025,
        ..single_stage(1.0)
    };
    let err = solve_implied_growth(&input).unwrap_err();
    assert!(matches!(err, ValuationError::DegenerateModelParameters(_)));
    assert!(err.is_config_problem());
}

#[test]
fn test_relative_one_correction_vs_converge() {
    let base = ModelParams {
        stage2_growth: Stage2Growth::RelativeToStage1 { ratio: 0.5 },
        ..ModelParams::default()
    };
    let one_shot = ReverseDcfEngine::new(base).unwrap();
    let converging = ReverseDcfEngine::new(ModelParams {
        relative_strategy: valuation_core::RelativeStrategy::Converge {
            max_passes: 50,
            tolerance: 1e-6,
        },
        ..base
    })
    .unwrap();

    let security = Fundamentals {
        ticker: "REL".to_string(),
        base_fcf: Some(100.0),
        market_price: Some(2.0),
        shares_outstanding: Some(1000.0),
        historical_growth_estimate: None,
    };

    let approx = one_shot.evaluate(&security);
    let fixed = converging.evaluate(&security);

    assert!(fixed.fixed_point.unwrap().converged);
    assert!(fixed.fixed_point.unwrap().passes > 2);
    // One correction lands close to, but not necessarily on, the fixed point
    assert_abs_diff_eq!(
        approx.implied_growth.unwrap(),
        fixed.implied_growth.unwrap(),
        epsilon = 5e-4
    );
}
