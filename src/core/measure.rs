use crate::core::financial::{ConsumerMetrics, FinancialMetrics};
use crate::core::segment::{SegmentKey, SegmentMarkets, TechType, YearMap};
use crate::core::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

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
pub enum AdoptionScenario {
    #[serde(rename = "Technical potential")]
    #[strum(serialize = "Technical potential")]
    TechnicalPotential,
    #[serde(rename = "Max adoption potential")]
    #[strum(serialize = "Max adoption potential")]
    MaxAdoptionPotential,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum CompetitionState {
    Uncompeted,
    Competed,
}

/// Consumer-choice model parameters attached to one contributing segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum ChoiceParameters {
    /// Log-linear logit over capital and operating cost.
    Residential {
        b1: YearMap<f64>,
        b2: YearMap<f64>,
    },
    /// Discrete choice across discount-rate bins; the adopter-population
    /// distribution may be overridden per segment.
    Commercial {
        #[serde(default)]
        rate_distribution: Option<Vec<f64>>,
    },
}

/// One entry of a measure's contributing-segment ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContributingSegment {
    pub markets: SegmentMarkets,
    pub choice: ChoiceParameters,
    /// Fraction of the baseline segment this measure applies to (0–1,
    /// possibly year-varying). `None` means the whole segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submarket_fraction: Option<YearMap<f64>>,
}

impl ContributingSegment {
    /// The sub-market fraction for a year; 1 where no scaling applies.
    pub fn submarket_fraction_for(&self, year: &str) -> f64 {
        self.submarket_fraction
            .as_ref()
            .and_then(|fractions| fractions.get(year).copied())
            .unwrap_or(1.)
    }

    pub fn has_submarket_scaling(&self, year: &str) -> bool {
        self.submarket_fraction_for(year) < 1.
    }
}

/// Baseline-minus-efficient differences over the master totals.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Savings {
    pub stock_cost: YearMap,
    pub energy: YearMap,
    pub energy_cost: YearMap,
    pub carbon: YearMap,
    pub carbon_cost: YearMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fugitive_methane: Option<YearMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fugitive_refrigerants: Option<YearMap>,
}

/// A measure's market data and computed savings for one competition state.
#[derive(Clone, Debug, Default)]
pub struct MarketsAndSavings {
    pub master: SegmentMarkets,
    pub ledger: IndexMap<SegmentKey, ContributingSegment>,
    pub savings: Savings,
}

impl MarketsAndSavings {
    /// Recomputes savings as baseline − efficient on every master channel.
    pub fn refresh_savings(&mut self, years: &[String]) {
        let master = &self.master;
        let diff = |baseline: &YearMap, efficient: &YearMap, year: &str| -> Value {
            let base = baseline.get(year).cloned().unwrap_or_default();
            let eff = efficient.get(year).cloned().unwrap_or_default();
            &base - &eff
        };

        for year in years {
            self.savings.stock_cost.insert(
                year.clone(),
                diff(
                    &master.cost.stock.total.baseline,
                    &master.cost.stock.total.efficient,
                    year,
                ),
            );
            self.savings.energy.insert(
                year.clone(),
                diff(
                    &master.energy.total.baseline,
                    &master.energy.total.efficient,
                    year,
                ),
            );
            self.savings.energy_cost.insert(
                year.clone(),
                diff(
                    &master.cost.energy.total.baseline,
                    &master.cost.energy.total.efficient,
                    year,
                ),
            );
            self.savings.carbon.insert(
                year.clone(),
                diff(
                    &master.carbon.total.baseline,
                    &master.carbon.total.efficient,
                    year,
                ),
            );
            self.savings.carbon_cost.insert(
                year.clone(),
                diff(
                    &master.cost.carbon.total.baseline,
                    &master.cost.carbon.total.efficient,
                    year,
                ),
            );
            if let Some(fugitive) = master.fugitive.as_ref() {
                self.savings
                    .fugitive_methane
                    .get_or_insert_with(YearMap::default)
                    .insert(
                        year.clone(),
                        diff(
                            &fugitive.methane.total.baseline,
                            &fugitive.methane.total.efficient,
                            year,
                        ),
                    );
                self.savings
                    .fugitive_refrigerants
                    .get_or_insert_with(YearMap::default)
                    .insert(
                        year.clone(),
                        diff(
                            &fugitive.refrigerants.total.baseline,
                            &fugitive.refrigerants.total.efficient,
                            year,
                        ),
                    );
            }
        }
    }
}

/// Uncompeted and competed market states for one adoption scenario. The
/// competed state starts as a copy of the uncompeted one and is mutated in
/// place during competition.
#[derive(Clone, Debug, Default)]
pub struct ScenarioMarkets {
    pub uncompeted: MarketsAndSavings,
    pub competed: MarketsAndSavings,
}

impl ScenarioMarkets {
    pub fn state(&self, state: CompetitionState) -> &MarketsAndSavings {
        match state {
            CompetitionState::Uncompeted => &self.uncompeted,
            CompetitionState::Competed => &self.competed,
        }
    }

    pub fn state_mut(&mut self, state: CompetitionState) -> &mut MarketsAndSavings {
        match state {
            CompetitionState::Uncompeted => &mut self.uncompeted,
            CompetitionState::Competed => &mut self.competed,
        }
    }
}

/// One candidate efficiency technology: applicability metadata, lifecycle,
/// per-scenario market data and computed metrics.
#[derive(Clone, Debug)]
pub struct Measure {
    pub name: String,
    pub climate_zones: Vec<String>,
    pub building_types: Vec<String>,
    pub fuels: Vec<String>,
    pub end_uses: Vec<String>,
    pub technologies: Vec<String>,
    pub tech_type: TechType,
    pub fuel_switch_to: Option<String>,
    pub market_entry_year: u32,
    pub years_on_market: Vec<String>,
    pub markets: IndexMap<AdoptionScenario, ScenarioMarkets>,
    pub financial_metrics: Option<FinancialMetrics>,
    pub consumer_metrics: Option<ConsumerMetrics>,
}

impl Measure {
    pub fn on_market(&self, year: &str) -> bool {
        self.years_on_market.iter().any(|y| y == year)
    }

    /// Lighting-type measures earn avoided-replacement credits when they
    /// outlive the baseline technology.
    pub fn is_lighting(&self) -> bool {
        self.end_uses.iter().any(|end_use| end_use == "lighting")
    }

    pub fn scenario(&self, scenario: AdoptionScenario) -> &ScenarioMarkets {
        &self.markets[&scenario]
    }

    pub fn scenario_mut(&mut self, scenario: AdoptionScenario) -> &mut ScenarioMarkets {
        self.markets
            .entry(scenario)
            .or_insert_with(ScenarioMarkets::default)
    }
}
