pub mod overlap;

use crate::core::competition::turnover::AdjustFractions;
use crate::core::measure::MarketsAndSavings;
use crate::core::segment::{SegmentClass, SegmentKey, TierFractions};
use crate::core::value::Value;
use crate::errors::EngineError;

/// Applies a measure's final market-share fractions for one primary segment,
/// scaling the contributing entry and decrementing the master totals in step
/// across every tracked channel.
pub fn apply_primary(
    markets: &mut MarketsAndSavings,
    key: &SegmentKey,
    years: &[String],
    fractions: &AdjustFractions,
) {
    let MarketsAndSavings { master, ledger, .. } = markets;
    let Some(segment) = ledger.get_mut(key) else {
        return;
    };
    for (year_idx, year) in years.iter().enumerate() {
        let fracs = TierFractions {
            total_baseline: fractions.total_baseline[year_idx].clone(),
            total_efficient: fractions.total_efficient[year_idx].clone(),
            competed_baseline: fractions.competed_baseline[year_idx].clone(),
            competed_efficient: fractions.competed_efficient[year_idx].clone(),
        };
        segment.markets.scale_all_with_master(master, year, &fracs);
    }
}

/// Adjusts a secondary (indirectly affected) segment. The factors are the
/// ratios of adjusted to original captured energy on the associated primary
/// segment(s), those sharing the secondary key's climate zone, building type
/// and structure. A secondary segment with no such primary is a structural
/// inconsistency and fatal.
pub fn apply_secondary(
    competed: &mut MarketsAndSavings,
    original: &MarketsAndSavings,
    key: &SegmentKey,
    years: &[String],
    measure_name: &str,
) -> Result<(), EngineError> {
    let associated: Vec<SegmentKey> = competed
        .ledger
        .keys()
        .filter(|candidate| {
            candidate.class == SegmentClass::Primary
                && candidate.climate_zone == key.climate_zone
                && candidate.building_type == key.building_type
                && candidate.structure == key.structure
        })
        .cloned()
        .collect();
    if associated.is_empty() {
        return Err(EngineError::MissingPrimaryLink {
            measure: measure_name.to_string(),
            segment: key.to_string(),
        });
    }

    let captured_sum = |markets: &MarketsAndSavings, year: &str, competed_tier: bool| -> Value {
        associated
            .iter()
            .filter_map(|primary| markets.ledger.get(primary))
            .map(|segment| {
                let pair = if competed_tier {
                    &segment.markets.energy.competed
                } else {
                    &segment.markets.energy.total
                };
                pair.efficient.get(year).cloned().unwrap_or_default()
            })
            .sum()
    };

    let fractions: Vec<TierFractions> = years
        .iter()
        .map(|year| {
            let adj_frac_total =
                captured_sum(competed, year, false).div_or(&captured_sum(original, year, false), 0.);
            let adj_frac_competed =
                captured_sum(competed, year, true).div_or(&captured_sum(original, year, true), 0.);
            TierFractions::uniform(adj_frac_total, adj_frac_competed)
        })
        .collect();

    let MarketsAndSavings { master, ledger, .. } = competed;
    let Some(segment) = ledger.get_mut(key) else {
        return Ok(());
    };
    for (year, fracs) in years.iter().zip(fractions.iter()) {
        segment.markets.scale_all_with_master(master, year, fracs);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::measure::{ChoiceParameters, ContributingSegment};
    use crate::core::segment::{
        SegmentMarkets, SidePair, StructureType, TechType, TwoTier, YearMap,
    };
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn year_map(entries: &[(&str, f64)]) -> YearMap {
        entries
            .iter()
            .map(|(year, value)| (year.to_string(), Value::Point(*value)))
            .collect()
    }

    fn two_tier(total_base: f64, total_eff: f64, comp_base: f64, comp_eff: f64) -> TwoTier {
        TwoTier {
            total: SidePair {
                baseline: year_map(&[("2025", total_base)]),
                efficient: year_map(&[("2025", total_eff)]),
            },
            competed: SidePair {
                baseline: year_map(&[("2025", comp_base)]),
                efficient: year_map(&[("2025", comp_eff)]),
            },
        }
    }

    fn segment(markets: SegmentMarkets) -> ContributingSegment {
        ContributingSegment {
            markets,
            choice: ChoiceParameters::Commercial {
                rate_distribution: None,
            },
            submarket_fraction: None,
        }
    }

    fn primary_key() -> SegmentKey {
        SegmentKey {
            class: SegmentClass::Primary,
            climate_zone: "CZ1".into(),
            building_type: "single family home".into(),
            fuel: "electricity".into(),
            end_use: "lighting".into(),
            tech_type: TechType::Supply,
            structure: StructureType::Existing,
        }
    }

    fn secondary_key() -> SegmentKey {
        SegmentKey {
            class: SegmentClass::Secondary,
            end_use: "heating".into(),
            tech_type: TechType::Demand,
            ..primary_key()
        }
    }

    fn markets_fixture() -> MarketsAndSavings {
        let seg_markets = SegmentMarkets {
            energy: two_tier(100., 80., 20., 16.),
            ..Default::default()
        };
        let mut markets = MarketsAndSavings {
            master: seg_markets.clone(),
            ..Default::default()
        };
        markets.ledger.insert(primary_key(), segment(seg_markets));
        markets
    }

    #[rstest]
    fn primary_adjustment_scales_ledger_and_master_together() {
        let mut markets = markets_fixture();
        let fractions = AdjustFractions {
            total_baseline: vec![Value::Point(0.5)],
            total_efficient: vec![Value::Point(0.5)],
            competed_baseline: vec![Value::Point(0.25)],
            competed_efficient: vec![Value::Point(0.25)],
        };

        apply_primary(
            &mut markets,
            &primary_key(),
            &["2025".to_string()],
            &fractions,
        );

        let segment = &markets.ledger[&primary_key()].markets;
        assert_eq!(segment.energy.total.baseline["2025"], Value::Point(50.));
        assert_eq!(segment.energy.competed.baseline["2025"], Value::Point(5.));
        assert_eq!(
            markets.master.energy.total.baseline["2025"],
            Value::Point(50.)
        );
        assert_eq!(
            markets.master.energy.competed.baseline["2025"],
            Value::Point(5.)
        );
    }

    #[rstest]
    fn secondary_adjustment_follows_the_primary_capture_ratio() {
        let mut competed = markets_fixture();
        let secondary_markets = SegmentMarkets {
            energy: two_tier(50., 40., 10., 8.),
            ..Default::default()
        };
        competed
            .ledger
            .insert(secondary_key(), segment(secondary_markets));
        let original = competed.clone();
        // competition halved the primary's captured (efficient) energy
        let fractions = AdjustFractions {
            total_baseline: vec![Value::Point(0.5)],
            total_efficient: vec![Value::Point(0.5)],
            competed_baseline: vec![Value::Point(0.5)],
            competed_efficient: vec![Value::Point(0.5)],
        };
        apply_primary(
            &mut competed,
            &primary_key(),
            &["2025".to_string()],
            &fractions,
        );

        apply_secondary(
            &mut competed,
            &original,
            &secondary_key(),
            &["2025".to_string()],
            "test measure",
        )
        .unwrap();

        let secondary = &competed.ledger[&secondary_key()].markets;
        assert_eq!(secondary.energy.total.baseline["2025"], Value::Point(25.));
        assert_eq!(secondary.energy.total.efficient["2025"], Value::Point(20.));
        assert_eq!(secondary.energy.competed.baseline["2025"], Value::Point(5.));
    }

    #[rstest]
    fn secondary_without_a_primary_link_is_fatal() {
        let secondary_markets = SegmentMarkets {
            energy: two_tier(50., 40., 10., 8.),
            ..Default::default()
        };
        let mut competed = MarketsAndSavings::default();
        competed
            .ledger
            .insert(secondary_key(), segment(secondary_markets));
        let original = competed.clone();

        let result = apply_secondary(
            &mut competed,
            &original,
            &secondary_key(),
            &["2025".to_string()],
            "test measure",
        );

        assert!(matches!(
            result,
            Err(EngineError::MissingPrimaryLink { .. })
        ));
    }
}
