use crate::core::competition::SegmentShares;
use crate::core::measure::AdoptionScenario;
use crate::core::value::Value;

/// Per-measure stock and captured-energy series for one segment, aligned
/// with the run's year order, feeding the turnover weighting.
#[derive(Clone, Debug, Default)]
pub struct TurnoverInputs {
    pub entry_year: u32,
    /// Total stock in the segment (baseline units).
    pub total_stock: Vec<Value>,
    /// Stock competed (turning over) each year.
    pub competed_stock: Vec<Value>,
    pub competed_baseline_energy: Vec<Value>,
    pub competed_efficient_energy: Vec<Value>,
    /// Total-tier energy, for the current relative-performance ratio.
    pub total_baseline_energy: Vec<Value>,
    pub total_efficient_energy: Vec<Value>,
}

/// Final adjustment fractions for one measure in one segment:
/// instantaneous shares for the competed tier, turnover-weighted cumulative
/// shares for the total tier, with the efficient side diverging where the
/// late-entry correction applies.
#[derive(Clone, Debug, Default)]
pub struct AdjustFractions {
    pub competed_baseline: Vec<Value>,
    pub competed_efficient: Vec<Value>,
    pub total_baseline: Vec<Value>,
    pub total_efficient: Vec<Value>,
}

/// Converts instantaneous market shares into effective captured shares.
///
/// Technical Potential assumes the whole stock turns over every year, so the
/// cumulative share is just the instantaneous one. Otherwise each year's
/// share is blended in at the rate stock actually turns over:
/// `cum = (1−wt)·cum + wt·share`, `wt = competed/total stock`, clamped to 1.
///
/// Measures entering the market after the earliest competitor get two
/// corrections: their cumulative stock share becomes the true
/// captured-stock ratio accumulated since entry, and their efficient-side
/// fraction is rescaled so post-adjustment relative performance matches the
/// relative performance of the stock actually captured since entry (with no
/// captured units, the ratio defaults to 1 and no savings are attributed).
pub fn weight(
    scenario: AdoptionScenario,
    year_numbers: &[u32],
    inputs: &[TurnoverInputs],
    shares: &SegmentShares,
) -> Vec<AdjustFractions> {
    if scenario == AdoptionScenario::TechnicalPotential {
        return shares
            .iter()
            .map(|measure_shares| AdjustFractions {
                competed_baseline: measure_shares.clone(),
                competed_efficient: measure_shares.clone(),
                total_baseline: measure_shares.clone(),
                total_efficient: measure_shares.clone(),
            })
            .collect();
    }

    let earliest_entry = inputs
        .iter()
        .map(|input| input.entry_year)
        .min()
        .unwrap_or_default();

    inputs
        .iter()
        .zip(shares.iter())
        .map(|(input, measure_shares)| {
            let late_entrant = input.entry_year > earliest_entry;
            let mut fractions = AdjustFractions::default();
            let mut cumulative = Value::ZERO;
            let mut captured_stock = Value::ZERO;
            let mut turnover_stock = Value::ZERO;
            let mut captured_baseline = Value::ZERO;
            let mut captured_efficient = Value::ZERO;

            for (year_idx, year) in year_numbers.iter().enumerate() {
                let share = &measure_shares[year_idx];
                if *year >= earliest_entry {
                    let wt = input.competed_stock[year_idx].div_or(&input.total_stock[year_idx], 0.);
                    let blended = &(&(&Value::ONE - &wt) * &cumulative) + &(&wt * share);
                    cumulative = blended.min_with(1.);
                } else {
                    cumulative = share.clone();
                }

                fractions.competed_baseline.push(share.clone());
                fractions.competed_efficient.push(share.clone());

                if late_entrant && *year >= input.entry_year {
                    captured_stock += &(&input.competed_stock[year_idx] * share);
                    turnover_stock += &input.total_stock[year_idx];
                    captured_baseline += &(&input.competed_baseline_energy[year_idx] * share);
                    captured_efficient += &(&input.competed_efficient_energy[year_idx] * share);

                    let stock_ratio = captured_stock.div_or(&turnover_stock, 0.);
                    // relative performance of the stock actually captured
                    // since entry vs the segment's current-year ratio
                    let rp_captured = captured_efficient.div_or(&captured_baseline, 1.);
                    let rp_current = input.total_efficient_energy[year_idx]
                        .div_or(&input.total_baseline_energy[year_idx], 1.);
                    let efficient_scale = rp_captured.div_or(&rp_current, 1.);

                    fractions.total_baseline.push(stock_ratio.clone());
                    fractions
                        .total_efficient
                        .push((&stock_ratio * &efficient_scale).min_with(1.));
                } else {
                    fractions.total_baseline.push(cumulative.clone());
                    fractions.total_efficient.push(cumulative.clone());
                }
            }

            fractions
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;

    fn inputs(entry_year: u32, years: usize, total: f64, competed: f64) -> TurnoverInputs {
        TurnoverInputs {
            entry_year,
            total_stock: vec![Value::Point(total); years],
            competed_stock: vec![Value::Point(competed); years],
            competed_baseline_energy: vec![Value::Point(10.); years],
            competed_efficient_energy: vec![Value::Point(8.); years],
            total_baseline_energy: vec![Value::Point(100.); years],
            total_efficient_energy: vec![Value::Point(80.); years],
        }
    }

    #[rstest]
    fn technical_potential_passes_shares_through() {
        let shares: SegmentShares = vec![vec![Value::Point(0.6), Value::Point(0.7)]];

        let fractions = weight(
            AdoptionScenario::TechnicalPotential,
            &[2025, 2026],
            &[inputs(2025, 2, 100., 10.)],
            &shares,
        );

        assert_eq!(fractions[0].total_baseline, shares[0]);
        assert_eq!(fractions[0].competed_baseline, shares[0]);
    }

    #[rstest]
    fn cumulative_share_blends_at_the_turnover_rate() {
        // 10% of stock turns over each year at a steady 0.6 share
        let shares: SegmentShares = vec![vec![Value::Point(0.6), Value::Point(0.6)]];

        let fractions = weight(
            AdoptionScenario::MaxAdoptionPotential,
            &[2025, 2026],
            &[inputs(2025, 2, 100., 10.)],
            &shares,
        );

        assert_relative_eq!(fractions[0].total_baseline[0].mean(), 0.06, epsilon = 1e-9);
        assert_relative_eq!(
            fractions[0].total_baseline[1].mean(),
            0.9 * 0.06 + 0.1 * 0.6,
            epsilon = 1e-9
        );
        // the competed tier keeps the instantaneous share
        assert_relative_eq!(fractions[0].competed_baseline[1].mean(), 0.6, epsilon = 1e-9);
    }

    #[rstest]
    fn zero_total_stock_contributes_no_turnover() {
        let shares: SegmentShares = vec![vec![Value::Point(0.6)]];

        let fractions = weight(
            AdoptionScenario::MaxAdoptionPotential,
            &[2025],
            &[inputs(2025, 1, 0., 0.)],
            &shares,
        );

        assert_eq!(fractions[0].total_baseline[0], Value::Point(0.));
    }

    #[rstest]
    fn late_entrant_gets_true_captured_stock_ratio() {
        let shares: SegmentShares = vec![
            vec![Value::Point(0.5), Value::Point(0.5)],
            vec![Value::Point(0.5), Value::Point(0.5)],
        ];
        let incumbent = inputs(2025, 2, 100., 10.);
        let late = inputs(2026, 2, 100., 10.);

        let fractions = weight(
            AdoptionScenario::MaxAdoptionPotential,
            &[2025, 2026],
            &[incumbent, late],
            &shares,
        );

        // in 2026 the late entrant has captured 10·0.5 of 100 turned-over
        // units since entry
        assert_relative_eq!(fractions[1].total_baseline[1].mean(), 0.05, epsilon = 1e-9);
        // captured relative performance (0.8) matches the segment-wide
        // ratio, so the efficient fraction is not rescaled
        assert_relative_eq!(fractions[1].total_efficient[1].mean(), 0.05, epsilon = 1e-9);
    }

    #[rstest]
    fn late_entrant_with_nothing_captured_attributes_no_savings() {
        let shares: SegmentShares = vec![
            vec![Value::Point(1.), Value::Point(1.)],
            vec![Value::Point(0.), Value::Point(0.)],
        ];
        let incumbent = inputs(2025, 2, 100., 10.);
        let late = inputs(2026, 2, 100., 0.);

        let fractions = weight(
            AdoptionScenario::MaxAdoptionPotential,
            &[2025, 2026],
            &[incumbent, late],
            &shares,
        );

        assert_eq!(fractions[1].total_baseline[1], Value::Point(0.));
        assert_eq!(fractions[1].total_efficient[1], Value::Point(0.));
    }
}
