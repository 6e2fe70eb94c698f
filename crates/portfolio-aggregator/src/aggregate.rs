//! Portfolio-level summaries of per-security valuations.
//! Pure functions over already-computed results, no I/O.
use std::collections::BTreeMap;

use statrs::statistics::{Data, Median, Statistics};
use valuation_core::{HoldingValuation, PortfolioSummary, RealismBucket};

/// Label of the summary that spans every portfolio.
pub const MERGED_LABEL: &str = "All Portfolios";

/// Ascending by `total_cmp`, so float reductions see the same order
/// whatever order the holdings arrived in.
fn sorted<I: IntoIterator<Item = f64>>(values: I) -> Vec<f64> {
    let mut values: Vec<f64> = values.into_iter().collect();
    values.sort_by(f64::total_cmp);
    values
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.mean())
    }
}

/// Summarize one group. Holdings without a defined implied growth only
/// contribute to `excluded_count`.
pub fn summarize(label: &str, members: &[&HoldingValuation]) -> PortfolioSummary {
    let defined: Vec<&HoldingValuation> = members
        .iter()
        .copied()
        .filter(|h| h.result.is_defined())
        .collect();

    let growths = sorted(defined.iter().filter_map(|h| h.result.implied_growth));
    let mos10 = sorted(defined.iter().filter_map(|h| h.result.mos10_growth));
    let mos20 = sorted(defined.iter().filter_map(|h| h.result.mos20_growth));

    let bucket_count = |bucket: RealismBucket| {
        defined
            .iter()
            .filter(|h| h.result.realism_bucket == Some(bucket))
            .count()
    };

    // Position-value weights; only holdings with shares and a price count
    let mut weights: Vec<(f64, f64)> = defined
        .iter()
        .filter_map(|h| Some((h.position_value()?, h.result.implied_growth?)))
        .collect();
    weights.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    let (weighted_sum, total_weight) = weights
        .iter()
        .fold((0.0, 0.0), |(sum, total), &(value, growth)| {
            (sum + value * growth, total + value)
        });

    PortfolioSummary {
        label: label.to_string(),
        ticker_count: defined.len(),
        excluded_count: members.len() - defined.len(),
        out_of_domain_count: defined.iter().filter(|h| h.result.is_out_of_domain()).count(),
        mean_implied_growth: mean_of(&growths),
        median_implied_growth: if growths.is_empty() {
            None
        } else {
            Some(Data::new(growths.clone()).median())
        },
        min_implied_growth: growths.first().copied(),
        max_implied_growth: growths.last().copied(),
        std_dev_implied_growth: if growths.len() >= 2 {
            Some(growths.std_dev())
        } else {
            None
        },
        weighted_implied_growth: if total_weight > 0.0 {
            Some(weighted_sum / total_weight)
        } else {
            None
        },
        mean_mos10_growth: mean_of(&mos10),
        mean_mos20_growth: mean_of(&mos20),
        conservative_count: bucket_count(RealismBucket::Conservative),
        reasonable_count: bucket_count(RealismBucket::Reasonable),
        aggressive_count: bucket_count(RealismBucket::Aggressive),
    }
}

/// Group valuations by portfolio label and summarize each group.
/// Input order does not matter; output is sorted by label.
pub fn aggregate<'a, I>(valuations: I) -> BTreeMap<String, PortfolioSummary>
where
    I: IntoIterator<Item = &'a HoldingValuation>,
{
    let mut groups: BTreeMap<&'a str, Vec<&'a HoldingValuation>> = BTreeMap::new();
    for valuation in valuations {
        groups
            .entry(valuation.portfolio.as_str())
            .or_default()
            .push(valuation);
    }

    groups
        .into_iter()
        .map(|(label, members)| (label.to_string(), summarize(label, &members)))
        .collect()
}

/// `aggregate` restricted to `labels`; an empty filter keeps every portfolio.
pub fn aggregate_filtered<'a, I>(valuations: I, labels: &[String]) -> BTreeMap<String, PortfolioSummary>
where
    I: IntoIterator<Item = &'a HoldingValuation>,
{
    aggregate(
        valuations
            .into_iter()
            .filter(|v| labels.is_empty() || labels.iter().any(|l| l == &v.portfolio)),
    )
}

/// One summary across all portfolios. A ticker held in several portfolios
/// counts once per holding.
pub fn aggregate_merged<'a, I>(valuations: I) -> PortfolioSummary
where
    I: IntoIterator<Item = &'a HoldingValuation>,
{
    let members: Vec<&HoldingValuation> = valuations.into_iter().collect();
    summarize(MERGED_LABEL, &members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use valuation_core::{SearchBound, ValuationResult, ValuationStatus};

    fn valued(portfolio: &str, ticker: &str, growth: Option<f64>, shares: Option<f64>) -> HoldingValuation {
        let status = match growth {
            Some(g) if g >= 1.0 => ValuationStatus::OutOfDomain {
                bound: SearchBound::Upper,
            },
            Some(_) => ValuationStatus::Solved,
            None => ValuationStatus::MissingData {
                reason: "base_fcf not available".to_string(),
            },
        };
        HoldingValuation {
            portfolio: portfolio.to_string(),
            shares,
            result: ValuationResult {
                ticker: ticker.to_string(),
                status,
                implied_growth: growth,
                mos10_growth: growth.map(|g| g - 0.01),
                mos20_growth: growth.map(|g| g - 0.02),
                realism_bucket: growth.map(bucket_for),
                market_price: Some(10.0),
                stage2_growth: None,
                fixed_point: None,
                historical_growth_estimate: None,
                yearly_breakdown: None,
            },
        }
    }

    fn bucket_for(g: f64) -> RealismBucket {
        if g < 0.05 {
            RealismBucket::Conservative
        } else if g < 0.15 {
            RealismBucket::Reasonable
        } else {
            RealismBucket::Aggressive
        }
    }

    fn sample() -> Vec<HoldingValuation> {
        vec![
            valued("Income", "KO", Some(0.03), Some(100.0)),
            valued("Growth", "NVDA", Some(0.25), Some(10.0)),
            valued("Growth", "MSFT", Some(0.10), Some(30.0)),
            valued("Income", "T", None, Some(50.0)),
            valued("Growth", "SNOW", Some(1.0), None),
            valued("Income", "PG", Some(0.06), None),
        ]
    }

    #[test]
    fn test_groups_by_label() {
        let summaries = aggregate(&sample());

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries.keys().collect::<Vec<_>>(), vec!["Growth", "Income"]);

        let income = &summaries["Income"];
        assert_eq!(income.ticker_count, 2);
        assert_eq!(income.excluded_count, 1);
        assert_relative_eq!(income.mean_implied_growth.unwrap(), 0.045, epsilon = 1e-12);
    }

    #[test]
    fn test_bucket_counts_sum_to_ticker_count() {
        for summary in aggregate(&sample()).values() {
            let buckets: usize = RealismBucket::ALL
                .iter()
                .map(|b| summary.bucket_count(*b))
                .sum();
            assert_eq!(buckets, summary.ticker_count);
        }
    }

    #[test]
    fn test_growth_statistics() {
        let growth = &aggregate(&sample())["Growth"];

        assert_eq!(growth.ticker_count, 3);
        assert_eq!(growth.out_of_domain_count, 1);
        assert_eq!(growth.aggressive_count, 2);
        assert_relative_eq!(growth.median_implied_growth.unwrap(), 0.25, epsilon = 1e-12);
        assert_relative_eq!(growth.min_implied_growth.unwrap(), 0.10);
        assert_relative_eq!(growth.max_implied_growth.unwrap(), 1.0);
        assert_relative_eq!(growth.mean_mos20_growth.unwrap(), 1.29 / 3.0, epsilon = 1e-12);
        assert!(growth.std_dev_implied_growth.unwrap() > 0.0);
        // Only NVDA (100) and MSFT (300) carry position values
        assert_relative_eq!(
            growth.weighted_implied_growth.unwrap(),
            (100.0 * 0.25 + 300.0 * 0.10) / 400.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_grouping_is_order_independent() {
        let mut reversed = sample();
        reversed.reverse();
        assert_eq!(aggregate(&sample()), aggregate(&reversed));
    }

    #[test]
    fn test_summary_bit_identical_under_permutation() {
        let members = vec![
            valued("Mix", "A", Some(0.1), Some(3.0)),
            valued("Mix", "B", Some(0.2), Some(7.0)),
            valued("Mix", "C", Some(0.3), Some(1.0)),
            valued("Mix", "D", Some(0.7), Some(2.0)),
        ];
        let baseline = aggregate_merged(&members);

        for rotation in 1..members.len() {
            let mut rotated = members.clone();
            rotated.rotate_left(rotation);
            let summary = aggregate_merged(&rotated);
            assert_eq!(summary, baseline);
            assert_eq!(
                summary.mean_implied_growth.map(f64::to_bits),
                baseline.mean_implied_growth.map(f64::to_bits)
            );
        }
    }

    #[test]
    fn test_all_undefined_group() {
        let valuations = vec![valued("Empty", "X", None, None)];
        let summary = &aggregate(&valuations)["Empty"];

        assert_eq!(summary.ticker_count, 0);
        assert_eq!(summary.excluded_count, 1);
        assert_eq!(summary.mean_implied_growth, None);
        assert_eq!(summary.median_implied_growth, None);
        assert_eq!(summary.std_dev_implied_growth, None);
    }

    #[test]
    fn test_filter_and_merge() {
        let valuations = sample();

        let only_income = aggregate_filtered(&valuations, &["Income".to_string()]);
        assert_eq!(only_income.len(), 1);
        assert!(only_income.contains_key("Income"));
        assert_eq!(aggregate_filtered(&valuations, &[]).len(), 2);

        let merged = aggregate_merged(&valuations);
        assert_eq!(merged.label, MERGED_LABEL);
        assert_eq!(merged.ticker_count, 5);
        assert_eq!(merged.excluded_count, 1);
    }
}
