use crate::core::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use strum_macros::{Display as StrumDisplay, EnumString};

/// Year-keyed series; keys are 4-digit-year strings throughout the engine.
pub type YearMap<T = Value> = IndexMap<String, T>;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SegmentClass {
    /// Directly replaced equipment or envelope.
    Primary,
    /// Indirectly affected energy use, e.g. waste-heat interactions.
    Secondary,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TechType {
    Supply,
    Demand,
}

impl TechType {
    pub fn other(&self) -> TechType {
        match self {
            TechType::Supply => TechType::Demand,
            TechType::Demand => TechType::Supply,
        }
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StructureType {
    New,
    Existing,
}

/// Uniquely identifies one slice of the baseline market that one or more
/// measures may compete for. `Ord` gives the deterministic visiting order the
/// engine relies on: primary segments sort ahead of secondary ones.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    pub class: SegmentClass,
    pub climate_zone: String,
    pub building_type: String,
    pub fuel: String,
    pub end_use: String,
    pub tech_type: TechType,
    pub structure: StructureType,
}

impl Display for SegmentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {}, {}, {})",
            self.class,
            self.climate_zone,
            self.building_type,
            self.fuel,
            self.end_use,
            self.tech_type,
            self.structure
        )
    }
}

/// Baseline and efficient projections for one quantity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SidePair {
    #[serde(default)]
    pub baseline: YearMap,
    #[serde(default)]
    pub efficient: YearMap,
}

impl SidePair {
    /// Scales this (contributing) pair's entries for `year` by the given
    /// fractions and removes the scaled-away portion from `master`, keeping
    /// the master total equal to the sum of its contributing segments.
    pub fn scale_with_master(
        &mut self,
        master: &mut SidePair,
        year: &str,
        baseline_frac: &Value,
        efficient_frac: &Value,
    ) {
        for (series, master_series, frac) in [
            (&mut self.baseline, &mut master.baseline, baseline_frac),
            (&mut self.efficient, &mut master.efficient, efficient_frac),
        ] {
            if let Some(original) = series.get(year).cloned() {
                let kept = &original * frac;
                if let Some(total) = master_series.get_mut(year) {
                    *total = &*total - &(&original - &kept);
                }
                series.insert(year.to_string(), kept);
            }
        }
    }
}

/// `{total, competed}` tiers of one quantity's baseline/efficient series.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TwoTier {
    #[serde(default)]
    pub total: SidePair,
    #[serde(default)]
    pub competed: SidePair,
}

/// Per-year adjustment fractions applied to one contributing segment:
/// `{total, competed} × {baseline, efficient}`.
#[derive(Clone, Debug, PartialEq)]
pub struct TierFractions {
    pub total_baseline: Value,
    pub total_efficient: Value,
    pub competed_baseline: Value,
    pub competed_efficient: Value,
}

impl TierFractions {
    /// A uniform fraction across all four positions, as secondary and overlap
    /// adjustments use for their baseline/efficient pairs.
    pub fn uniform(total: Value, competed: Value) -> Self {
        Self {
            total_baseline: total.clone(),
            total_efficient: total,
            competed_baseline: competed.clone(),
            competed_efficient: competed,
        }
    }
}

impl TwoTier {
    pub fn scale_with_master(&mut self, master: &mut TwoTier, year: &str, fracs: &TierFractions) {
        self.total.scale_with_master(
            &mut master.total,
            year,
            &fracs.total_baseline,
            &fracs.total_efficient,
        );
        self.competed.scale_with_master(
            &mut master.competed,
            year,
            &fracs.competed_baseline,
            &fracs.competed_efficient,
        );
    }
}

/// Dollar totals tracked alongside each physical quantity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CostChannels {
    #[serde(default)]
    pub stock: TwoTier,
    #[serde(default)]
    pub energy: TwoTier,
    #[serde(default)]
    pub carbon: TwoTier,
}

/// Optional fugitive-emissions series mirrored through the adjusters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FugitiveMarkets {
    #[serde(default)]
    pub methane: TwoTier,
    #[serde(default)]
    pub refrigerants: TwoTier,
}

/// Expected service lifetimes, in years. The baseline technology's lifetime
/// may vary by year; the measure's is a single figure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lifetime {
    #[serde(default)]
    pub baseline: YearMap<f64>,
    pub measure: f64,
}

impl Default for Lifetime {
    fn default() -> Self {
        Self {
            baseline: YearMap::default(),
            measure: 1.,
        }
    }
}

/// The full stock/energy/carbon/cost record kept for a measure's master
/// microsegment and for each of its contributing segments.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMarkets {
    #[serde(default)]
    pub stock: TwoTier,
    #[serde(default)]
    pub energy: TwoTier,
    #[serde(default)]
    pub carbon: TwoTier,
    #[serde(default)]
    pub cost: CostChannels,
    /// Efficient-captured energy variant, tracked for fuel-switching measures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_captured: Option<YearMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fugitive: Option<FugitiveMarkets>,
    #[serde(default)]
    pub lifetime: Lifetime,
}

impl SegmentMarkets {
    /// Applies adjustment fractions for `year` to every tracked channel of
    /// this contributing segment, decrementing `master` in step.
    pub fn scale_all_with_master(
        &mut self,
        master: &mut SegmentMarkets,
        year: &str,
        fracs: &TierFractions,
    ) {
        self.stock.scale_with_master(&mut master.stock, year, fracs);
        self.scale_energy_channels_with_master(master, year, fracs);
        self.cost
            .stock
            .scale_with_master(&mut master.cost.stock, year, fracs);
    }

    /// Applies fractions to the energy-linked channels only (energy, carbon,
    /// their costs, captured energy, fugitive emissions), as the
    /// supply–demand overlap adjustment requires.
    pub fn scale_energy_channels_with_master(
        &mut self,
        master: &mut SegmentMarkets,
        year: &str,
        fracs: &TierFractions,
    ) {
        self.energy
            .scale_with_master(&mut master.energy, year, fracs);
        self.carbon
            .scale_with_master(&mut master.carbon, year, fracs);
        self.cost
            .energy
            .scale_with_master(&mut master.cost.energy, year, fracs);
        self.cost
            .carbon
            .scale_with_master(&mut master.cost.carbon, year, fracs);
        if let (Some(captured), Some(master_captured)) = (
            self.energy_captured.as_mut(),
            master.energy_captured.as_mut(),
        ) {
            if let Some(original) = captured.get(year).cloned() {
                let kept = &original * &fracs.total_efficient;
                if let Some(total) = master_captured.get_mut(year) {
                    *total = &*total - &(&original - &kept);
                }
                captured.insert(year.to_string(), kept);
            }
        }
        if let (Some(fugitive), Some(master_fugitive)) =
            (self.fugitive.as_mut(), master.fugitive.as_mut())
        {
            fugitive
                .methane
                .scale_with_master(&mut master_fugitive.methane, year, fracs);
            fugitive
                .refrigerants
                .scale_with_master(&mut master_fugitive.refrigerants, year, fracs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn year_map(entries: &[(&str, f64)]) -> YearMap {
        entries
            .iter()
            .map(|(year, value)| (year.to_string(), Value::Point(*value)))
            .collect()
    }

    #[fixture]
    fn key() -> SegmentKey {
        SegmentKey {
            class: SegmentClass::Primary,
            climate_zone: "CZ1".into(),
            building_type: "single family home".into(),
            fuel: "electricity".into(),
            end_use: "heating".into(),
            tech_type: TechType::Supply,
            structure: StructureType::Existing,
        }
    }

    #[rstest]
    fn key_displays_as_tuple(key: SegmentKey) {
        assert_eq!(
            key.to_string(),
            "(primary, CZ1, single family home, electricity, heating, supply, existing)"
        );
    }

    #[rstest]
    fn primary_keys_sort_before_secondary(key: SegmentKey) {
        let secondary = SegmentKey {
            class: SegmentClass::Secondary,
            ..key.clone()
        };
        assert!(key < secondary);
    }

    #[rstest]
    fn scaling_keeps_master_consistent_with_contributions() {
        let mut contrib = SidePair {
            baseline: year_map(&[("2025", 40.)]),
            efficient: year_map(&[("2025", 30.)]),
        };
        let mut master = SidePair {
            baseline: year_map(&[("2025", 100.)]),
            efficient: year_map(&[("2025", 80.)]),
        };

        contrib.scale_with_master(
            &mut master,
            "2025",
            &Value::Point(0.25),
            &Value::Point(0.5),
        );

        assert_eq!(contrib.baseline["2025"], Value::Point(10.));
        assert_eq!(contrib.efficient["2025"], Value::Point(15.));
        // master loses exactly what the contribution lost
        assert_eq!(master.baseline["2025"], Value::Point(70.));
        assert_eq!(master.efficient["2025"], Value::Point(65.));
    }

    #[rstest]
    fn scaling_skips_years_without_data() {
        let mut contrib = SidePair {
            baseline: year_map(&[("2025", 40.)]),
            efficient: YearMap::default(),
        };
        let mut master = SidePair {
            baseline: year_map(&[("2025", 100.)]),
            efficient: YearMap::default(),
        };

        contrib.scale_with_master(&mut master, "2030", &Value::Point(0.5), &Value::Point(0.5));

        assert_eq!(contrib.baseline["2025"], Value::Point(40.));
        assert_eq!(master.baseline["2025"], Value::Point(100.));
    }
}
