use crate::core::adjustment::{self, overlap};
use crate::core::competition::turnover::{self, AdjustFractions, TurnoverInputs};
use crate::core::competition::{commercial, residential, submarket, Competitor, SegmentShares};
use crate::core::financial;
use crate::core::measure::{
    AdoptionScenario, ChoiceParameters, CompetitionState, ContributingSegment, MarketsAndSavings,
    Measure, ScenarioMarkets,
};
use crate::core::segment::{SegmentClass, SegmentKey, StructureType, YearMap};
use crate::core::value::Value;
use crate::errors::EngineError;
use crate::input::{AnalysisInput, RunConfig};
use crate::output::{
    summarize, AggregateMarkets, BreakoutTree, FilterVariables, FinancialMetricsOutput,
    MarketsSavingsOutput, MeasureOutput, RunResults, ScenarioOutput, YearSummaries,
};
use indexmap::IndexMap;
use itertools::izip;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Orchestrates one analysis: uncompeted savings, measure competition,
/// competed savings and finalized outputs, per adoption scenario.
pub struct Engine {
    config: RunConfig,
    years: Vec<String>,
    year_numbers: Vec<u32>,
    measures: Vec<Measure>,
    overlap_pools: BTreeMap<overlap::OverlapKey, YearMap<f64>>,
}

impl Engine {
    pub fn from_input(input: AnalysisInput) -> Result<Self, EngineError> {
        let AnalysisInput {
            run: config,
            measures: measure_inputs,
            overlap_totals,
        } = input;
        if measure_inputs.is_empty() {
            return Err(EngineError::EmptyAnalysis);
        }
        let years = config.years();
        let year_numbers = config.year_numbers();
        if years.is_empty() {
            return Err(EngineError::EmptyYearRange);
        }

        let measures = measure_inputs
            .into_iter()
            .map(|measure| {
                let years_on_market = measure.years_on_market(&config);
                let ledger: IndexMap<SegmentKey, ContributingSegment> = measure
                    .contributing_segments
                    .iter()
                    .map(|segment| {
                        (
                            segment.key(),
                            ContributingSegment {
                                markets: segment.markets.clone(),
                                choice: segment.choice.clone(),
                                submarket_fraction: segment.submarket_fraction.clone(),
                            },
                        )
                    })
                    .collect();
                let uncompeted = MarketsAndSavings {
                    master: measure.markets,
                    ledger,
                    savings: Default::default(),
                };
                let markets = config
                    .adoption_scenarios
                    .iter()
                    .map(|scenario| {
                        (
                            *scenario,
                            ScenarioMarkets {
                                uncompeted: uncompeted.clone(),
                                competed: uncompeted.clone(),
                            },
                        )
                    })
                    .collect();

                Measure {
                    name: measure.name,
                    climate_zones: measure.climate_zones,
                    building_types: measure.building_types,
                    fuels: measure.fuels,
                    end_uses: measure.end_uses,
                    technologies: measure.technologies,
                    tech_type: measure.tech_type,
                    fuel_switch_to: measure.fuel_switch_to,
                    market_entry_year: measure.market_entry_year,
                    years_on_market,
                    markets,
                    financial_metrics: None,
                    consumer_metrics: None,
                }
            })
            .collect();

        let overlap_pools = overlap_totals
            .into_iter()
            .map(|pool| {
                (
                    overlap::OverlapKey {
                        climate_zone: pool.climate_zone,
                        building_type: pool.building_type,
                        structure: pool.structure,
                        fuel: pool.fuel,
                        end_use: pool.end_use,
                    },
                    pool.total,
                )
            })
            .collect();

        Ok(Self {
            config,
            years,
            year_numbers,
            measures,
            overlap_pools,
        })
    }

    pub fn run(mut self) -> Result<RunResults, EngineError> {
        info!(
            measures = self.measures.len(),
            start = self.year_numbers.first().copied().unwrap_or_default(),
            end = self.year_numbers.last().copied().unwrap_or_default(),
            "starting competition analysis"
        );
        self.update_financial_metrics();
        for scenario in self.config.adoption_scenarios.clone() {
            self.calc_savings_metrics(scenario, CompetitionState::Uncompeted);
            self.compete_measures(scenario)?;
            self.calc_savings_metrics(scenario, CompetitionState::Competed);
        }
        Ok(self.finalize_outputs())
    }

    /// Financial and consumer metrics are scenario-invariant: they derive
    /// from Technical-Potential uncompeted unit data (or the first scenario
    /// in the run when Technical Potential is absent).
    fn update_financial_metrics(&mut self) {
        let scenario = if self
            .config
            .adoption_scenarios
            .contains(&AdoptionScenario::TechnicalPotential)
        {
            AdoptionScenario::TechnicalPotential
        } else {
            self.config.adoption_scenarios[0]
        };
        for measure in &mut self.measures {
            let (metrics, consumer) = financial::update_metrics(
                &measure.markets[&scenario].uncompeted.master,
                measure.is_lighting(),
                &self.years,
                self.config.discount_rate,
            );
            measure.financial_metrics = Some(metrics);
            measure.consumer_metrics = Some(consumer);
        }
    }

    fn calc_savings_metrics(&mut self, scenario: AdoptionScenario, state: CompetitionState) {
        for measure in &mut self.measures {
            measure
                .scenario_mut(scenario)
                .state_mut(state)
                .refresh_savings(&self.years);
        }
    }

    /// Apportions every contested primary segment among its claimant
    /// measures, then propagates the outcomes to secondary segments and the
    /// heating/cooling supply–demand overlaps. Segments are visited in
    /// sorted key order, primary before secondary.
    fn compete_measures(&mut self, scenario: AdoptionScenario) -> Result<(), EngineError> {
        let mut claimants: BTreeMap<SegmentKey, Vec<usize>> = BTreeMap::new();
        for (idx, measure) in self.measures.iter().enumerate() {
            for key in measure.scenario(scenario).competed.ledger.keys() {
                claimants.entry(key.clone()).or_default().push(idx);
            }
        }
        info!(
            %scenario,
            segments = claimants.len(),
            "competing measures for contested segments"
        );

        for (key, measure_idxs) in &claimants {
            if key.class != SegmentClass::Primary || measure_idxs.len() < 2 {
                continue;
            }
            debug!(segment = %key, claimants = measure_idxs.len(), "apportioning segment");
            let fractions = self.segment_fractions(scenario, key, measure_idxs);
            for (competitor_idx, &measure_idx) in measure_idxs.iter().enumerate() {
                let markets = self.measures[measure_idx].scenario_mut(scenario);
                adjustment::apply_primary(
                    &mut markets.competed,
                    key,
                    &self.years,
                    &fractions[competitor_idx],
                );
            }
        }

        for (key, measure_idxs) in &claimants {
            if key.class != SegmentClass::Secondary {
                continue;
            }
            for &measure_idx in measure_idxs {
                let name = self.measures[measure_idx].name.clone();
                let ScenarioMarkets {
                    uncompeted,
                    competed,
                } = self.measures[measure_idx].scenario_mut(scenario);
                adjustment::apply_secondary(competed, uncompeted, key, &self.years, &name)?;
            }
        }

        self.adjust_supply_demand_overlap(scenario);

        Ok(())
    }

    /// Computes final adjustment fractions for one contested primary
    /// segment: consumer-choice shares, sub-market redistribution, then
    /// stock-turnover weighting. Shares are derived entirely from read-only
    /// inputs before any measure's totals are touched, so the outcome does
    /// not depend on measure order.
    fn segment_fractions(
        &self,
        scenario: AdoptionScenario,
        key: &SegmentKey,
        measure_idxs: &[usize],
    ) -> Vec<AdjustFractions> {
        let year_count = self.years.len();
        let competitors: Vec<Competitor> = measure_idxs
            .iter()
            .map(|&idx| self.build_competitor(scenario, key, idx))
            .collect();

        let shares = if self.config.is_residential(&key.building_type) {
            residential::market_shares(&competitors, year_count)
        } else {
            commercial::market_shares(&competitors, year_count)
        };
        let added = submarket::redistribute(&competitors, &shares, year_count);

        // a sub-market-scaled measure only applies f of its share; the rest
        // was redistributed above
        let applied_shares: SegmentShares = izip!(&shares, &competitors, &added)
            .map(|(measure_shares, competitor, measure_added)| {
                measure_shares
                    .iter()
                    .enumerate()
                    .map(|(year_idx, share)| {
                        &(share * competitor.submarket_fraction[year_idx])
                            + &measure_added[year_idx]
                    })
                    .collect()
            })
            .collect();

        let turnover_inputs: Vec<TurnoverInputs> = measure_idxs
            .iter()
            .map(|&idx| self.build_turnover_inputs(scenario, key, idx))
            .collect();

        turnover::weight(
            scenario,
            &self.year_numbers,
            &turnover_inputs,
            &applied_shares,
        )
    }

    fn build_competitor(
        &self,
        scenario: AdoptionScenario,
        key: &SegmentKey,
        measure_idx: usize,
    ) -> Competitor {
        let measure = &self.measures[measure_idx];
        let Some(segment) = measure.scenario(scenario).uncompeted.ledger.get(key) else {
            return Competitor {
                on_market: vec![false; self.years.len()],
                capital: vec![None; self.years.len()],
                operating: vec![None; self.years.len()],
                b1: vec![0.; self.years.len()],
                b2: vec![0.; self.years.len()],
                bin_costs: vec![None; self.years.len()],
                rate_distribution: None,
                submarket_fraction: vec![1.; self.years.len()],
            };
        };
        let consumer = measure.consumer_metrics.as_ref();

        let (b1, b2): (Vec<f64>, Vec<f64>) = match &segment.choice {
            ChoiceParameters::Residential { b1, b2 } => self
                .years
                .iter()
                .map(|year| {
                    (
                        b1.get(year).copied().unwrap_or_default(),
                        b2.get(year).copied().unwrap_or_default(),
                    )
                })
                .unzip(),
            ChoiceParameters::Commercial { .. } => {
                (vec![0.; self.years.len()], vec![0.; self.years.len()])
            }
        };
        let rate_distribution = match &segment.choice {
            ChoiceParameters::Commercial { rate_distribution } => rate_distribution.clone(),
            ChoiceParameters::Residential { .. } => None,
        };

        Competitor {
            on_market: self.years.iter().map(|year| measure.on_market(year)).collect(),
            capital: self
                .years
                .iter()
                .map(|year| {
                    consumer.and_then(|c| c.annualized_capital.get(year).cloned().flatten())
                })
                .collect(),
            operating: self
                .years
                .iter()
                .map(|year| consumer.and_then(|c| c.unit_operating.get(year).cloned().flatten()))
                .collect(),
            b1,
            b2,
            bin_costs: self
                .years
                .iter()
                .map(|year| consumer.and_then(|c| c.anpv_total(year)))
                .collect(),
            rate_distribution,
            submarket_fraction: self
                .years
                .iter()
                .map(|year| segment.submarket_fraction_for(year))
                .collect(),
        }
    }

    fn build_turnover_inputs(
        &self,
        scenario: AdoptionScenario,
        key: &SegmentKey,
        measure_idx: usize,
    ) -> TurnoverInputs {
        let measure = &self.measures[measure_idx];
        let Some(segment) = measure.scenario(scenario).uncompeted.ledger.get(key) else {
            return TurnoverInputs {
                entry_year: measure.market_entry_year,
                total_stock: vec![Value::ZERO; self.years.len()],
                competed_stock: vec![Value::ZERO; self.years.len()],
                competed_baseline_energy: vec![Value::ZERO; self.years.len()],
                competed_efficient_energy: vec![Value::ZERO; self.years.len()],
                total_baseline_energy: vec![Value::ZERO; self.years.len()],
                total_efficient_energy: vec![Value::ZERO; self.years.len()],
            };
        };
        let series = |map: &YearMap| -> Vec<Value> {
            self.years
                .iter()
                .map(|year| map.get(year).cloned().unwrap_or_default())
                .collect()
        };
        TurnoverInputs {
            entry_year: measure.market_entry_year,
            total_stock: series(&segment.markets.stock.total.baseline),
            competed_stock: series(&segment.markets.stock.competed.baseline),
            competed_baseline_energy: series(&segment.markets.energy.competed.baseline),
            competed_efficient_energy: series(&segment.markets.energy.competed.efficient),
            total_baseline_energy: series(&segment.markets.energy.total.baseline),
            total_efficient_energy: series(&segment.markets.energy.total.efficient),
        }
    }

    /// Removes double counting between supply-side and demand-side measures
    /// whose affected heating/cooling energy pools overlap.
    fn adjust_supply_demand_overlap(&mut self, scenario: AdoptionScenario) {
        let mut ledger = overlap::OverlapLedger::new();
        for measure in &self.measures {
            for (key, segment) in &measure.scenario(scenario).uncompeted.ledger {
                if self.config.is_heating_cooling(&key.end_use) {
                    overlap::accumulate_segment(&mut ledger, key, &segment.markets, &self.years);
                }
            }
        }
        for (key, sides) in ledger.iter_mut() {
            if let Some(pool) = self.overlap_pools.get(key) {
                sides.pool = Some(pool.clone());
            }
        }

        for measure_idx in 0..self.measures.len() {
            let keys: Vec<SegmentKey> = self.measures[measure_idx]
                .scenario(scenario)
                .competed
                .ledger
                .keys()
                .filter(|key| self.config.is_heating_cooling(&key.end_use))
                .cloned()
                .collect();
            for key in keys {
                let Some(sides) = ledger.get(&overlap::OverlapKey::from_segment(&key)) else {
                    continue;
                };
                if !sides.has_both_sides() {
                    continue;
                }
                let (baseline_factors, efficient_factors) =
                    overlap::factors(sides, key.tech_type, &self.years);
                let markets = self.measures[measure_idx].scenario_mut(scenario);
                overlap::apply(
                    &mut markets.competed,
                    &key,
                    &self.years,
                    &baseline_factors,
                    &efficient_factors,
                );
            }
        }
    }

    /// Summarizes every measure's competed markets and savings, partitions
    /// them into category breakouts, and totals across measures.
    fn finalize_outputs(self) -> RunResults {
        let mut measure_outputs = Vec::with_capacity(self.measures.len());
        let mut aggregate: IndexMap<String, AggregateMarkets> = self
            .config
            .adoption_scenarios
            .iter()
            .map(|scenario| (scenario.to_string(), AggregateMarkets::default()))
            .collect();

        for measure in &self.measures {
            let mut markets_and_savings = IndexMap::new();
            for scenario in &self.config.adoption_scenarios {
                let competed = &measure.scenario(*scenario).competed;
                let overall = self.overall_output(competed);
                let by_category = self.category_breakouts(competed);
                markets_and_savings
                    .insert(scenario.to_string(), ScenarioOutput { overall, by_category });

                if let Some(totals) = aggregate.get_mut(&scenario.to_string()) {
                    self.accumulate_aggregate(totals, competed);
                }
            }

            measure_outputs.push(MeasureOutput {
                name: measure.name.clone(),
                filter_variables: FilterVariables {
                    climate_zones: measure.climate_zones.clone(),
                    building_types: measure.building_types.clone(),
                    fuels: measure.fuels.clone(),
                    end_uses: measure.end_uses.clone(),
                    technologies: measure.technologies.clone(),
                },
                markets_and_savings,
                financial_metrics: self.financial_output(measure),
            });
        }

        RunResults {
            measures: measure_outputs,
            aggregate,
        }
    }

    fn overall_output(&self, competed: &MarketsAndSavings) -> MarketsSavingsOutput {
        let master = &competed.master;
        let savings = &competed.savings;
        MarketsSavingsOutput {
            baseline_energy_mmbtu: summarize(&master.energy.total.baseline),
            efficient_energy_mmbtu: summarize(&master.energy.total.efficient),
            efficient_energy_captured_mmbtu: master
                .energy_captured
                .as_ref()
                .map(summarize),
            energy_savings_mmbtu: summarize(&savings.energy),
            energy_cost_savings_usd: summarize(&savings.energy_cost),
            baseline_carbon_mmt: summarize(&master.carbon.total.baseline),
            efficient_carbon_mmt: summarize(&master.carbon.total.efficient),
            carbon_savings_mmt: summarize(&savings.carbon),
            carbon_cost_savings_usd: summarize(&savings.carbon_cost),
            stock_cost_savings_usd: summarize(&savings.stock_cost),
            fugitive_methane_savings_mmt: savings.fugitive_methane.as_ref().map(summarize),
            fugitive_refrigerant_savings_mmt: savings
                .fugitive_refrigerants
                .as_ref()
                .map(summarize),
        }
    }

    /// Category partition fractions are segment-level baseline (or
    /// efficient) energy over the measure total, per year; applied to the
    /// summarized totals, with savings recomputed as baseline − efficient at
    /// every leaf.
    fn category_breakouts(&self, competed: &MarketsAndSavings) -> BreakoutTree {
        let master = &competed.master;
        let mut tree = BreakoutTree::default();

        for (key, segment) in &competed.ledger {
            let building_class = format!(
                "{} ({})",
                if self.config.is_residential(&key.building_type) {
                    "Residential"
                } else {
                    "Commercial"
                },
                match key.structure {
                    StructureType::New => "New",
                    StructureType::Existing => "Existing",
                }
            );
            let end_use = self.config.end_use_category(&key.end_use);
            let fuel = if self.config.breakout_fuels {
                key.fuel.clone()
            } else {
                "All".to_string()
            };
            let leaf = tree
                .entry(key.climate_zone.clone())
                .or_default()
                .entry(building_class)
                .or_default()
                .entry(end_use)
                .or_default()
                .entry(fuel)
                .or_default();

            for year in &self.years {
                let apportion = |segment_series: &YearMap, total_series: &YearMap| -> f64 {
                    let segment_value = segment_series.get(year).cloned().unwrap_or_default();
                    let total = total_series.get(year).cloned().unwrap_or_default();
                    let fraction = segment_value.div_or(&total, 0.).mean();
                    fraction * total.mean()
                };
                *leaf.baseline.entry(year.clone()).or_default() += apportion(
                    &segment.markets.energy.total.baseline,
                    &master.energy.total.baseline,
                );
                *leaf.efficient.entry(year.clone()).or_default() += apportion(
                    &segment.markets.energy.total.efficient,
                    &master.energy.total.efficient,
                );
                if let (Some(segment_captured), Some(master_captured)) = (
                    segment.markets.energy_captured.as_ref(),
                    master.energy_captured.as_ref(),
                ) {
                    *leaf
                        .efficient_captured
                        .get_or_insert_with(Default::default)
                        .entry(year.clone())
                        .or_default() += apportion(segment_captured, master_captured);
                }
            }
        }

        for climate in tree.values_mut() {
            for building_class in climate.values_mut() {
                for end_use in building_class.values_mut() {
                    for leaf in end_use.values_mut() {
                        leaf.refresh_savings();
                    }
                }
            }
        }

        tree
    }

    fn accumulate_aggregate(&self, totals: &mut AggregateMarkets, competed: &MarketsAndSavings) {
        let master = &competed.master;
        let savings = &competed.savings;
        let mut add = |target: &mut IndexMap<String, f64>, series: &YearMap| {
            for year in &self.years {
                let value = series.get(year).map(Value::mean).unwrap_or_default();
                *target.entry(year.clone()).or_default() += value;
            }
        };
        add(
            &mut totals.baseline_energy_mmbtu,
            &master.energy.total.baseline,
        );
        add(
            &mut totals.efficient_energy_mmbtu,
            &master.energy.total.efficient,
        );
        add(&mut totals.energy_savings_mmbtu, &savings.energy);
        add(&mut totals.energy_cost_savings_usd, &savings.energy_cost);
        add(
            &mut totals.baseline_carbon_mmt,
            &master.carbon.total.baseline,
        );
        add(
            &mut totals.efficient_carbon_mmt,
            &master.carbon.total.efficient,
        );
        add(&mut totals.carbon_savings_mmt, &savings.carbon);
        add(&mut totals.carbon_cost_savings_usd, &savings.carbon_cost);
        add(&mut totals.stock_cost_savings_usd, &savings.stock_cost);
    }

    fn financial_output(&self, measure: &Measure) -> FinancialMetricsOutput {
        let Some(metrics) = measure.financial_metrics.as_ref() else {
            return FinancialMetricsOutput::default();
        };
        let unit_cost_by_rate_bin = measure.consumer_metrics.as_ref().and_then(|consumer| {
            let mut bins: IndexMap<String, YearSummaries> = IndexMap::new();
            for (bin_idx, _) in financial::RATE_BINS.iter().enumerate() {
                let mut series = YearSummaries::new();
                for year in &self.years {
                    if let Some(total) = consumer.anpv_total(year) {
                        series.insert(year.clone(), (&total[bin_idx]).into());
                    }
                }
                if !series.is_empty() {
                    bins.insert(format!("rate {}", bin_idx + 1), series);
                }
            }
            (!bins.is_empty()).then_some(bins)
        });

        FinancialMetricsOutput {
            cce_usd_per_mmbtu: summarize(&metrics.cce),
            cce_with_carbon_benefits_usd_per_mmbtu: summarize(&metrics.cce_carbon_benefits),
            ccc_usd_per_ton: summarize(&metrics.ccc),
            ccc_with_energy_benefits_usd_per_ton: summarize(&metrics.ccc_energy_benefits),
            irr_energy: summarize(&metrics.irr_energy),
            irr_energy_carbon: summarize(&metrics.irr_energy_carbon),
            payback_energy_years: summarize(&metrics.payback_energy),
            payback_energy_carbon_years: summarize(&metrics.payback_energy_carbon),
            unit_cost_by_rate_bin,
        }
    }
}
