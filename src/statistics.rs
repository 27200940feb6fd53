/// A simple statistics module with utility functions for summarizing
/// Monte-Carlo sample vectors into point estimates.
use statrs::statistics::{Data, OrderStatistics};

pub(crate) fn percentile(samples: &[f64], percentile: usize) -> f64 {
    let samples = samples.to_vec();
    let mut data = Data::new(samples);

    data.percentile(percentile)
}

pub(crate) fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}
