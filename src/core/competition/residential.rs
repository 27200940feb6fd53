use crate::core::competition::{Competitor, SegmentShares};
use crate::core::units::LOGIT_EXPONENT_FLOOR;
use crate::core::value::Value;

/// Market shares for residential adopters: a log-linear logit over annualized
/// capital and operating cost. Measures lacking cost data weigh zero; years
/// where no competitor is on the market split evenly; a zero weight total
/// splits evenly among on-market measures.
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

        let weights: Vec<Value> = competitors
            .iter()
            .enumerate()
            .map(|(m, competitor)| {
                if !on_market[m] {
                    return Value::ZERO;
                }
                match (
                    competitor.capital[year_idx].as_ref(),
                    competitor.operating[year_idx].as_ref(),
                ) {
                    (Some(capital), Some(operating)) => {
                        let exponent = &(capital * competitor.b1[year_idx])
                            + &(operating * competitor.b2[year_idx]);
                        exponent.max_with(LOGIT_EXPONENT_FLOOR).map(f64::exp)
                    }
                    _ => Value::ZERO,
                }
            })
            .collect();
        let total: Value = weights.iter().cloned().sum();
        let even = 1. / on_count as f64;

        for (m, weight) in weights.iter().enumerate() {
            let share = weight.zip_with(&total, |weight, total| {
                if total == 0. {
                    if on_market[m] {
                        even
                    } else {
                        0.
                    }
                } else {
                    weight / total
                }
            });
            shares[m].push(share);
        }
    }

    shares
}
