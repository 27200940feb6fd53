use crate::core::measure::{AdoptionScenario, ChoiceParameters};
use crate::core::segment::{
    SegmentClass, SegmentKey, SegmentMarkets, StructureType, TechType, YearMap,
};
use crate::core::units::year_key;
use anyhow::{anyhow, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_valid::Validate;
use std::io::Read;

/// Reads and validates a full analysis input from JSON.
pub fn ingest_for_processing(json: impl Read) -> Result<AnalysisInput, anyhow::Error> {
    let input: AnalysisInput =
        serde_json::from_reader(json).map_err(|error| anyhow!("parsing analysis input: {error}"))?;
    input
        .run
        .validate()
        .map_err(|errors| anyhow!("invalid run parameters: {errors}"))?;
    input.check_consistency()?;
    Ok(input)
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisInput {
    pub run: RunConfig,
    pub measures: Vec<MeasureInput>,
    /// Total possibly-overlapping heating/cooling energy per pool, produced
    /// by the upstream baseline pipeline.
    #[serde(default)]
    pub overlap_totals: Vec<OverlapTotalInput>,
}

impl AnalysisInput {
    fn check_consistency(&self) -> Result<(), anyhow::Error> {
        if self.run.aeo_start_year > self.run.aeo_end_year {
            bail!(
                "AEO year range runs backwards ({}–{})",
                self.run.aeo_start_year,
                self.run.aeo_end_year
            );
        }
        if self.measures.is_empty() {
            bail!("no measures were supplied");
        }
        for measure in &self.measures {
            if measure.contributing_segments.is_empty() {
                bail!(
                    "measure '{}' has no contributing segments",
                    measure.name
                );
            }
            for segment in &measure.contributing_segments {
                if let Some(fractions) = segment.submarket_fraction.as_ref() {
                    for (year, fraction) in fractions {
                        if !(0. ..=1.).contains(fraction) {
                            bail!(
                                "sub-market fraction {fraction} for {} in {year} on measure '{}' \
                                 is outside 0–1",
                                segment.key(),
                                measure.name
                            );
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn default_discount_rate() -> f64 {
    0.07
}

fn default_scenarios() -> Vec<AdoptionScenario> {
    vec![
        AdoptionScenario::TechnicalPotential,
        AdoptionScenario::MaxAdoptionPotential,
    ]
}

fn default_residential_building_types() -> Vec<String> {
    ["single family home", "multi family home", "mobile home"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_heating_cooling_end_uses() -> Vec<String> {
    ["heating", "cooling", "secondary heating"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Global run parameters, constructed once and passed by reference into
/// every component.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default = "default_discount_rate")]
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    pub discount_rate: f64,
    pub aeo_start_year: u32,
    pub aeo_end_year: u32,
    #[serde(default = "default_scenarios")]
    #[validate(min_items = 1)]
    pub adoption_scenarios: Vec<AdoptionScenario>,
    #[serde(default = "default_residential_building_types")]
    pub residential_building_types: Vec<String>,
    #[serde(default = "default_heating_cooling_end_uses")]
    pub heating_cooling_end_uses: Vec<String>,
    /// Maps segment end uses onto output end-use categories; unmapped end
    /// uses pass through unchanged.
    #[serde(default)]
    pub end_use_categories: IndexMap<String, String>,
    /// Whether category breakouts carry a fuel level.
    #[serde(default)]
    pub breakout_fuels: bool,
}

impl RunConfig {
    pub fn years(&self) -> Vec<String> {
        self.year_numbers().into_iter().map(year_key).collect()
    }

    pub fn year_numbers(&self) -> Vec<u32> {
        (self.aeo_start_year..=self.aeo_end_year).collect()
    }

    pub fn is_residential(&self, building_type: &str) -> bool {
        self.residential_building_types
            .iter()
            .any(|t| t == building_type)
    }

    pub fn is_heating_cooling(&self, end_use: &str) -> bool {
        self.heating_cooling_end_uses.iter().any(|e| e == end_use)
    }

    pub fn end_use_category(&self, end_use: &str) -> String {
        self.end_use_categories
            .get(end_use)
            .cloned()
            .unwrap_or_else(|| end_use.to_string())
    }
}

/// One measure record: applicability metadata, lifecycle, master
/// microsegment and contributing-segment ledger.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeasureInput {
    pub name: String,
    #[serde(default)]
    pub climate_zones: Vec<String>,
    #[serde(default)]
    pub building_types: Vec<String>,
    #[serde(default)]
    pub fuels: Vec<String>,
    #[serde(default)]
    pub end_uses: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    pub tech_type: TechType,
    #[serde(default)]
    pub fuel_switch_to: Option<String>,
    pub market_entry_year: u32,
    /// First year the measure is no longer sold; open-ended when absent.
    #[serde(default)]
    pub market_exit_year: Option<u32>,
    /// Master microsegment (uncompeted).
    pub markets: SegmentMarkets,
    pub contributing_segments: Vec<ContributingSegmentInput>,
}

impl MeasureInput {
    /// Years the measure is on the market, clipped to the run's year range.
    pub fn years_on_market(&self, run: &RunConfig) -> Vec<String> {
        run.year_numbers()
            .into_iter()
            .filter(|year| {
                *year >= self.market_entry_year
                    && self.market_exit_year.map_or(true, |exit| *year < exit)
            })
            .map(year_key)
            .collect()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContributingSegmentInput {
    #[serde(default = "default_segment_class")]
    pub class: SegmentClass,
    pub climate_zone: String,
    pub building_type: String,
    pub fuel: String,
    pub end_use: String,
    pub tech_type: TechType,
    pub structure: StructureType,
    pub markets: SegmentMarkets,
    pub choice: ChoiceParameters,
    #[serde(default)]
    pub submarket_fraction: Option<YearMap<f64>>,
}

fn default_segment_class() -> SegmentClass {
    SegmentClass::Primary
}

impl ContributingSegmentInput {
    pub fn key(&self) -> SegmentKey {
        SegmentKey {
            class: self.class,
            climate_zone: self.climate_zone.clone(),
            building_type: self.building_type.clone(),
            fuel: self.fuel.clone(),
            end_use: self.end_use.clone(),
            tech_type: self.tech_type,
            structure: self.structure,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlapTotalInput {
    pub climate_zone: String,
    pub building_type: String,
    pub structure: StructureType,
    pub fuel: String,
    pub end_use: String,
    pub total: YearMap<f64>,
}
