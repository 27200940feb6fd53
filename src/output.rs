use crate::core::segment::YearMap;
use crate::core::value::Value;
use indexmap::IndexMap;
use serde::Serialize;
use std::io::Write;

/// Mean/5th/95th-percentile summary of one year entry; point values
/// degenerate to three identical figures.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ValueSummary {
    pub mean: f64,
    pub low: f64,
    pub high: f64,
}

impl From<&Value> for ValueSummary {
    fn from(value: &Value) -> Self {
        Self {
            mean: value.mean(),
            low: value.low(),
            high: value.high(),
        }
    }
}

pub type YearSummaries = IndexMap<String, ValueSummary>;

pub fn summarize(series: &YearMap) -> YearSummaries {
    series
        .iter()
        .map(|(year, value)| (year.clone(), ValueSummary::from(value)))
        .collect()
}

/// The applicability metadata a measure was filtered on.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FilterVariables {
    pub climate_zones: Vec<String>,
    pub building_types: Vec<String>,
    pub fuels: Vec<String>,
    pub end_uses: Vec<String>,
    pub technologies: Vec<String>,
}

/// Summarized markets and savings for one measure and adoption scenario.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MarketsSavingsOutput {
    pub baseline_energy_mmbtu: YearSummaries,
    pub efficient_energy_mmbtu: YearSummaries,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efficient_energy_captured_mmbtu: Option<YearSummaries>,
    pub energy_savings_mmbtu: YearSummaries,
    pub energy_cost_savings_usd: YearSummaries,
    pub baseline_carbon_mmt: YearSummaries,
    pub efficient_carbon_mmt: YearSummaries,
    pub carbon_savings_mmt: YearSummaries,
    pub carbon_cost_savings_usd: YearSummaries,
    pub stock_cost_savings_usd: YearSummaries,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fugitive_methane_savings_mmt: Option<YearSummaries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fugitive_refrigerant_savings_mmt: Option<YearSummaries>,
}

/// One leaf of the category breakout tree. Savings equal baseline −
/// efficient at every leaf.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BreakoutLeaf {
    pub baseline: IndexMap<String, f64>,
    pub efficient: IndexMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efficient_captured: Option<IndexMap<String, f64>>,
    pub savings: IndexMap<String, f64>,
}

impl BreakoutLeaf {
    /// Recomputes savings from the baseline and efficient entries.
    pub fn refresh_savings(&mut self) {
        self.savings = self
            .baseline
            .iter()
            .map(|(year, baseline)| {
                let efficient = self.efficient.get(year).copied().unwrap_or_default();
                (year.clone(), baseline - efficient)
            })
            .collect();
    }
}

/// climate zone → building class → end-use category → fuel → leaf.
pub type BreakoutTree = IndexMap<String, IndexMap<String, IndexMap<String, IndexMap<String, BreakoutLeaf>>>>;

#[derive(Clone, Debug, Default, Serialize)]
pub struct ScenarioOutput {
    pub overall: MarketsSavingsOutput,
    pub by_category: BreakoutTree,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct FinancialMetricsOutput {
    pub cce_usd_per_mmbtu: YearSummaries,
    pub cce_with_carbon_benefits_usd_per_mmbtu: YearSummaries,
    pub ccc_usd_per_ton: YearSummaries,
    pub ccc_with_energy_benefits_usd_per_ton: YearSummaries,
    pub irr_energy: YearSummaries,
    pub irr_energy_carbon: YearSummaries,
    pub payback_energy_years: YearSummaries,
    pub payback_energy_carbon_years: YearSummaries,
    /// Total annualized unit cost per commercial discount-rate bin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_cost_by_rate_bin: Option<IndexMap<String, YearSummaries>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MeasureOutput {
    pub name: String,
    pub filter_variables: FilterVariables,
    /// Keyed by adoption-scenario name.
    pub markets_and_savings: IndexMap<String, ScenarioOutput>,
    pub financial_metrics: FinancialMetricsOutput,
}

/// Across-measure totals for one adoption scenario, mean values by year.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AggregateMarkets {
    pub baseline_energy_mmbtu: IndexMap<String, f64>,
    pub efficient_energy_mmbtu: IndexMap<String, f64>,
    pub energy_savings_mmbtu: IndexMap<String, f64>,
    pub energy_cost_savings_usd: IndexMap<String, f64>,
    pub baseline_carbon_mmt: IndexMap<String, f64>,
    pub efficient_carbon_mmt: IndexMap<String, f64>,
    pub carbon_savings_mmt: IndexMap<String, f64>,
    pub carbon_cost_savings_usd: IndexMap<String, f64>,
    pub stock_cost_savings_usd: IndexMap<String, f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunResults {
    pub measures: Vec<MeasureOutput>,
    /// Keyed by adoption-scenario name.
    pub aggregate: IndexMap<String, AggregateMarkets>,
}

pub fn write_results(results: &RunResults, writer: impl Write) -> Result<(), anyhow::Error> {
    serde_json::to_writer_pretty(writer, results)?;
    Ok(())
}
