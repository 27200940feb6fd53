use crate::core::competition::{Competitor, SegmentShares};
use crate::core::financial::RATE_BINS;
use crate::core::value::Value;
use ordered_float::OrderedFloat;

/// Fractions of the commercial adopter population falling into each
/// discount-rate bin, most to least myopic.
pub const DEFAULT_ADOPTER_FRACTIONS: [f64; 7] = [0.265, 0.226, 0.196, 0.192, 0.105, 0.013, 0.003];

/// Market shares for commercial adopters: within each discount-rate bin the
/// measure(s) with the lowest annualized lifecycle cost win that bin's
/// population fraction, ties splitting evenly. Distribution-valued costs are
/// compared elementwise. Measures lacking cost data are excluded from the
/// bins; if none have data the on-market measures split evenly.
pub fn market_shares(competitors: &[Competitor], year_count: usize) -> SegmentShares {
    let n = competitors.len();
    let mut shares: SegmentShares = vec![Vec::with_capacity(year_count); n];

    for year_idx in 0..year_count {
        let on_market: Vec<bool> = competitors
            .iter()
            .map(|competitor| competitor.on_market[year_idx])
            .collect();
        let on_count = on_market.iter().filter(|on| **on).count();
        if on_count == 0 {
            for measure_shares in shares.iter_mut() {
                measure_shares.push(Value::Point(1. / n as f64));
            }
            continue;
        }

        let contenders: Vec<usize> = (0..n)
            .filter(|&m| on_market[m] && competitors[m].bin_costs[year_idx].is_some())
            .collect();
        if contenders.is_empty() {
            let even = 1. / on_count as f64;
            for (m, measure_shares) in shares.iter_mut().enumerate() {
                measure_shares.push(Value::Point(if on_market[m] { even } else { 0. }));
            }
            continue;
        }

        let adopter_fractions = competitors
            .iter()
            .find_map(|competitor| competitor.rate_distribution.clone())
            .unwrap_or_else(|| DEFAULT_ADOPTER_FRACTIONS.to_vec());
        let bin_costs: Vec<&Vec<Value>> = contenders
            .iter()
            .map(|&m| {
                competitors[m].bin_costs[year_idx]
                    .as_ref()
                    .expect("contenders are filtered to measures with bin costs")
            })
            .collect();
        let sample_count = bin_costs
            .iter()
            .flat_map(|costs| costs.iter().map(Value::sample_count))
            .max()
            .unwrap_or(1);

        let mut accumulated = vec![vec![0.; sample_count]; n];
        for (bin, fraction) in adopter_fractions.iter().enumerate().take(RATE_BINS.len()) {
            for sample in 0..sample_count {
                let costs: Vec<(usize, f64)> = contenders
                    .iter()
                    .zip(bin_costs.iter())
                    .map(|(&m, costs)| (m, costs[bin].sample(sample)))
                    .collect();
                let minimum = costs
                    .iter()
                    .map(|(_, cost)| OrderedFloat(*cost))
                    .min()
                    .map(|cost| cost.0)
                    .unwrap_or(f64::INFINITY);
                let winners = costs.iter().filter(|(_, cost)| *cost == minimum).count();
                for (m, cost) in &costs {
                    if *cost == minimum {
                        accumulated[*m][sample] += fraction / winners as f64;
                    }
                }
            }
        }

        for (m, samples) in accumulated.into_iter().enumerate() {
            shares[m].push(if sample_count == 1 {
                Value::Point(samples[0])
            } else {
                Value::Distribution(samples)
            });
        }
    }

    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;

    fn competitor(bin_costs: Vec<Value>, years: usize) -> Competitor {
        Competitor {
            on_market: vec![true; years],
            bin_costs: vec![Some(bin_costs); years],
            submarket_fraction: vec![1.; years],
            ..Default::default()
        }
    }

    fn flat_costs(cost: f64) -> Vec<Value> {
        vec![Value::Point(cost); RATE_BINS.len()]
    }

    #[rstest]
    fn cheapest_measure_takes_every_bin() {
        let competitors = vec![competitor(flat_costs(100.), 1), competitor(flat_costs(150.), 1)];

        let shares = market_shares(&competitors, 1);

        assert_relative_eq!(shares[0][0].mean(), 1., epsilon = 1e-9);
        assert_relative_eq!(shares[1][0].mean(), 0., epsilon = 1e-9);
    }

    #[rstest]
    fn tied_measures_split_each_bin_evenly() {
        let competitors = vec![competitor(flat_costs(100.), 1), competitor(flat_costs(100.), 1)];

        let shares = market_shares(&competitors, 1);

        assert_relative_eq!(shares[0][0].mean(), 0.5, epsilon = 1e-9);
        assert_relative_eq!(shares[1][0].mean(), 0.5, epsilon = 1e-9);
    }

    #[rstest]
    fn bins_can_split_between_measures() {
        // A is cheaper for the three most myopic bins, B for the rest
        let costs_a: Vec<Value> = [90., 90., 90., 110., 110., 110., 110.]
            .iter()
            .map(|c| Value::Point(*c))
            .collect();
        let competitors = vec![competitor(costs_a, 1), competitor(flat_costs(100.), 1)];

        let shares = market_shares(&competitors, 1);

        let expected_a: f64 = DEFAULT_ADOPTER_FRACTIONS[..3].iter().sum();
        assert_relative_eq!(shares[0][0].mean(), expected_a, epsilon = 1e-9);
        assert_relative_eq!(shares[1][0].mean(), 1. - expected_a, epsilon = 1e-9);
    }

    #[rstest]
    fn shares_always_sum_to_one() {
        let competitors = vec![
            competitor(flat_costs(120.), 1),
            competitor(flat_costs(100.), 1),
            competitor(flat_costs(100.), 1),
        ];

        let shares = market_shares(&competitors, 1);

        let total: f64 = shares.iter().map(|s| s[0].mean()).sum();
        assert_relative_eq!(total, 1., epsilon = 1e-9);
    }

    #[rstest]
    fn measures_without_cost_data_split_evenly() {
        let mut a = competitor(flat_costs(100.), 1);
        let mut b = competitor(flat_costs(100.), 1);
        a.bin_costs = vec![None];
        b.bin_costs = vec![None];

        let shares = market_shares(&[a, b], 1);

        assert_eq!(shares[0][0], Value::Point(0.5));
        assert_eq!(shares[1][0], Value::Point(0.5));
    }

    #[rstest]
    fn distribution_costs_are_compared_per_sample() {
        let costs_a: Vec<Value> = vec![Value::Distribution(vec![90., 120.]); RATE_BINS.len()];
        let competitors = vec![competitor(costs_a, 1), competitor(flat_costs(100.), 1)];

        let shares = market_shares(&competitors, 1);

        let Value::Distribution(samples) = &shares[0][0] else {
            panic!("expected distribution shares");
        };
        assert_relative_eq!(samples[0], 1., epsilon = 1e-9);
        assert_relative_eq!(samples[1], 0., epsilon = 1e-9);
    }
}
