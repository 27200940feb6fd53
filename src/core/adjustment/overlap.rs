use crate::core::measure::MarketsAndSavings;
use crate::core::segment::{SegmentKey, StructureType, TechType, TierFractions, YearMap};
use crate::core::value::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// One heating/cooling energy pool jointly determined by supply-side
/// (equipment) and demand-side (envelope) measures.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OverlapKey {
    pub climate_zone: String,
    pub building_type: String,
    pub structure: StructureType,
    pub fuel: String,
    pub end_use: String,
}

impl OverlapKey {
    pub fn from_segment(key: &SegmentKey) -> Self {
        Self {
            climate_zone: key.climate_zone.clone(),
            building_type: key.building_type.clone(),
            structure: key.structure,
            fuel: key.fuel.clone(),
            end_use: key.end_use.clone(),
        }
    }
}

impl Display for OverlapKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.climate_zone, self.building_type, self.structure, self.fuel, self.end_use
        )
    }
}

/// Energy affected and saved by one technology type's measures in one pool.
#[derive(Clone, Debug, Default)]
pub struct SideTotals {
    pub affected: YearMap,
    pub savings: YearMap,
}

impl SideTotals {
    fn affected_for(&self, year: &str) -> Value {
        self.affected.get(year).cloned().unwrap_or_default()
    }

    fn savings_for(&self, year: &str) -> Value {
        self.savings.get(year).cloned().unwrap_or_default()
    }

    /// Signed relative performance, 1 − savings/affected (1 where nothing is
    /// affected).
    fn relative_performance(&self, year: &str) -> Value {
        &Value::ONE - &self.savings_for(year).div_or(&self.affected_for(year), 0.)
    }
}

/// Both sides of one pool plus the total possibly-overlapping energy, which
/// arrives as an input; absent that, each side's affected energy stands in
/// for the pool.
#[derive(Clone, Debug, Default)]
pub struct OverlapSides {
    pub supply: SideTotals,
    pub demand: SideTotals,
    pub pool: Option<YearMap<f64>>,
}

impl OverlapSides {
    pub fn side(&self, tech_type: TechType) -> &SideTotals {
        match tech_type {
            TechType::Supply => &self.supply,
            TechType::Demand => &self.demand,
        }
    }

    fn side_mut(&mut self, tech_type: TechType) -> &mut SideTotals {
        match tech_type {
            TechType::Supply => &mut self.supply,
            TechType::Demand => &mut self.demand,
        }
    }

    pub fn has_both_sides(&self) -> bool {
        !self.supply.affected.is_empty() && !self.demand.affected.is_empty()
    }

    fn pool_for(&self, year: &str, fallback: &Value) -> Value {
        match self.pool.as_ref().and_then(|pool| pool.get(year)) {
            Some(total) => Value::Point(*total),
            None => fallback.clone(),
        }
    }
}

/// Sorted so factor computation and application visit pools deterministically.
pub type OverlapLedger = BTreeMap<OverlapKey, OverlapSides>;

/// Accumulates the overlap ledger from every measure's heating/cooling
/// segments (uncompeted data), attaching input pool totals where provided.
pub fn accumulate_segment(
    ledger: &mut OverlapLedger,
    key: &SegmentKey,
    markets: &crate::core::segment::SegmentMarkets,
    years: &[String],
) {
    let sides = ledger.entry(OverlapKey::from_segment(key)).or_default();
    let side = sides.side_mut(key.tech_type);
    for year in years {
        let baseline = markets
            .energy
            .total
            .baseline
            .get(year)
            .cloned()
            .unwrap_or_default();
        let efficient = markets
            .energy
            .total
            .efficient
            .get(year)
            .cloned()
            .unwrap_or_default();
        let affected = side.affected.entry(year.clone()).or_default();
        *affected += &baseline;
        let savings = side.savings.entry(year.clone()).or_default();
        *savings += &(&baseline - &efficient);
    }
}

/// Baseline and efficient adjustment factors for a measure on `side` of one
/// pool. The unaffected slice of the pool passes through untouched; the
/// affected slice is apportioned by each side's contribution to total
/// savings, and the efficient case is further scaled by the other side's
/// relative performance, which reflects savings that side already realized.
pub fn factors(
    sides: &OverlapSides,
    side: TechType,
    years: &[String],
) -> (Vec<Value>, Vec<Value>) {
    let this_side = sides.side(side);
    let other_side = sides.side(side.other());

    years
        .iter()
        .map(|year| {
            let deviation_self = this_side
                .savings_for(year)
                .div_or(&this_side.affected_for(year), 0.)
                .map(f64::abs);
            let deviation_other = other_side
                .savings_for(year)
                .div_or(&other_side.affected_for(year), 0.)
                .map(f64::abs);
            let save_ratio = deviation_self.zip_with(&deviation_other, |a, b| {
                if is_close!(a + b, 0., abs_tol = 1e-12) {
                    0.5
                } else {
                    a / (a + b)
                }
            });

            let affected_other = other_side.affected_for(year);
            let pool = sides.pool_for(year, &affected_other);
            let frac_other = affected_other.div_or(&pool, 0.);

            let baseline_factor = &(&Value::ONE - &frac_other) + &(&frac_other * &save_ratio);
            let efficient_factor = &baseline_factor * &other_side.relative_performance(year);
            (baseline_factor, efficient_factor)
        })
        .unzip()
}

/// Applies overlap factors to one of a measure's segments, scaling the
/// energy-linked channels of both the ledger entry and the master totals.
pub fn apply(
    markets: &mut MarketsAndSavings,
    key: &SegmentKey,
    years: &[String],
    baseline_factors: &[Value],
    efficient_factors: &[Value],
) {
    let MarketsAndSavings { master, ledger, .. } = markets;
    let Some(segment) = ledger.get_mut(key) else {
        return;
    };
    for (year_idx, year) in years.iter().enumerate() {
        let fracs = TierFractions {
            total_baseline: baseline_factors[year_idx].clone(),
            total_efficient: efficient_factors[year_idx].clone(),
            competed_baseline: baseline_factors[year_idx].clone(),
            competed_efficient: efficient_factors[year_idx].clone(),
        };
        segment
            .markets
            .scale_energy_channels_with_master(master, year, &fracs);
    }
}
