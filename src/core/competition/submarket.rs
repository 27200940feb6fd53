use crate::core::competition::{Competitor, SegmentShares};
use crate::core::value::Value;

/// Redistributes the unapplied portion of sub-market-scaled measures' shares
/// to measures that apply to the full segment. A measure serving only
/// fraction `f` of the baseline leaves `(1−f)·share` on the table; eligible
/// receivers (no sub-market scaling of their own) gain it in proportion to
/// their current shares, or evenly when all eligible shares are zero.
/// Returns the per-measure share additions.
pub fn redistribute(
    competitors: &[Competitor],
    shares: &SegmentShares,
    year_count: usize,
) -> SegmentShares {
    let n = competitors.len();
    let mut added: SegmentShares = vec![Vec::with_capacity(year_count); n];

    for year_idx in 0..year_count {
        let eligible: Vec<usize> = (0..n)
            .filter(|&m| competitors[m].submarket_fraction[year_idx] >= 1.)
            .collect();
        let unapplied: Value = (0..n)
            .filter(|&m| competitors[m].submarket_fraction[year_idx] < 1.)
            .map(|m| &shares[m][year_idx] * (1. - competitors[m].submarket_fraction[year_idx]))
            .sum();

        if eligible.is_empty() || unapplied.is_zero() {
            for measure_added in added.iter_mut() {
                measure_added.push(Value::ZERO);
            }
            continue;
        }

        let eligible_total: Value = eligible
            .iter()
            .map(|&m| shares[m][year_idx].clone())
            .sum();
        let even = 1. / eligible.len() as f64;
        for (m, measure_added) in added.iter_mut().enumerate() {
            if !eligible.contains(&m) {
                measure_added.push(Value::ZERO);
                continue;
            }
            let weight = shares[m][year_idx].zip_with(&eligible_total, |share, total| {
                if total == 0. {
                    even
                } else {
                    share / total
                }
            });
            measure_added.push(&unapplied * &weight);
        }
    }

    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;

    fn competitor(submarket_fraction: f64) -> Competitor {
        Competitor {
            on_market: vec![true],
            submarket_fraction: vec![submarket_fraction],
            ..Default::default()
        }
    }

    #[rstest]
    fn unapplied_share_flows_to_full_segment_measures() {
        let competitors = vec![competitor(0.4), competitor(1.), competitor(1.)];
        let shares: SegmentShares = vec![
            vec![Value::Point(0.5)],
            vec![Value::Point(0.3)],
            vec![Value::Point(0.2)],
        ];

        let added = redistribute(&competitors, &shares, 1);

        // 0.6 of the scaled measure's 0.5 share is unapplied, split 3:2
        assert_eq!(added[0][0], Value::ZERO);
        assert_relative_eq!(added[1][0].mean(), 0.3 * 0.6 * 0.5 / 0.5, epsilon = 1e-9);
        assert_relative_eq!(added[2][0].mean(), 0.2 * 0.6 * 0.5 / 0.5, epsilon = 1e-9);

        // coverage is conserved: Σ f·share + Σ added = 1
        let applied: f64 = competitors
            .iter()
            .zip(shares.iter())
            .map(|(c, s)| c.submarket_fraction[0] * s[0].mean())
            .sum();
        let redistributed: f64 = added.iter().map(|a| a[0].mean()).sum();
        assert_relative_eq!(applied + redistributed, 1., epsilon = 1e-9);
    }

    #[rstest]
    fn zero_eligible_shares_split_evenly() {
        let competitors = vec![competitor(0.5), competitor(1.), competitor(1.)];
        let shares: SegmentShares = vec![
            vec![Value::Point(1.)],
            vec![Value::Point(0.)],
            vec![Value::Point(0.)],
        ];

        let added = redistribute(&competitors, &shares, 1);

        assert_relative_eq!(added[1][0].mean(), 0.25, epsilon = 1e-9);
        assert_relative_eq!(added[2][0].mean(), 0.25, epsilon = 1e-9);
    }

    #[rstest]
    fn no_eligible_receivers_means_no_redistribution() {
        let competitors = vec![competitor(0.5), competitor(0.8)];
        let shares: SegmentShares = vec![vec![Value::Point(0.6)], vec![Value::Point(0.4)]];

        let added = redistribute(&competitors, &shares, 1);

        assert_eq!(added[0][0], Value::ZERO);
        assert_eq!(added[1][0], Value::ZERO);
    }

    #[rstest]
    fn fully_applicable_measures_redistribute_nothing() {
        let competitors = vec![competitor(1.), competitor(1.)];
        let shares: SegmentShares = vec![vec![Value::Point(0.6)], vec![Value::Point(0.4)]];

        let added = redistribute(&competitors, &shares, 1);

        assert_eq!(added[0][0], Value::ZERO);
        assert_eq!(added[1][0], Value::ZERO);
    }
}
