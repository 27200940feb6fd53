pub mod commercial;
pub mod residential;
pub mod submarket;
pub mod turnover;

use crate::core::value::Value;

/// Cost and availability inputs for one measure competing in one segment.
/// Every series is aligned with the run's year order.
#[derive(Clone, Debug, Default)]
pub struct Competitor {
    pub on_market: Vec<bool>,
    /// Annualized unit capital cost, the residential logit's capital input.
    pub capital: Vec<Option<Value>>,
    /// Unit operating (energy) cost.
    pub operating: Vec<Option<Value>>,
    /// Residential logit coefficients.
    pub b1: Vec<f64>,
    pub b2: Vec<f64>,
    /// Total annualized unit cost per discount-rate bin, the commercial
    /// discrete-choice input.
    pub bin_costs: Vec<Option<Vec<Value>>>,
    /// Adopter-population override for the commercial rate distribution.
    pub rate_distribution: Option<Vec<f64>>,
    /// Sub-market fraction per year (1 = applies to the whole segment).
    pub submarket_fraction: Vec<f64>,
}

/// Instantaneous market shares per measure per year; the outer index aligns
/// with the competitor list, the inner with the year list.
pub type SegmentShares = Vec<Vec<Value>>;
