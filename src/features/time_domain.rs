//! Time-domain summary features.

use ndarray::{Array2, ArrayD};
use serde_json::{json, Value};

use crate::error::Result;
use crate::features::{instances, stats, FeatureExtractor};

/// Per channel: mean, standard deviation, skewness, excess kurtosis,
/// peak-to-peak amplitude, median, interquartile range — 7 features per
/// channel, concatenated across channels per instance.
#[derive(Debug, Clone, Default)]
pub struct TimeDomainExtractor;

const FEATURES_PER_CHANNEL: usize = 7;

impl TimeDomainExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureExtractor for TimeDomainExtractor {
    fn name(&self) -> &'static str {
        "time_domain"
    }

    fn params(&self) -> Value {
        json!({})
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<Array2<f64>> {
        let parts = instances(x)?;
        let n_channels = x.shape()[0];
        let mut out = Array2::zeros((parts.len(), n_channels * FEATURES_PER_CHANNEL));

        for (i, instance) in parts.iter().enumerate() {
            for (c, channel) in instance.rows().into_iter().enumerate() {
                let samples: Vec<f64> = channel.iter().copied().collect();
                let base = c * FEATURES_PER_CHANNEL;
                out[[i, base]] = stats::mean(&samples);
                out[[i, base + 1]] = stats::std_dev(&samples);
                out[[i, base + 2]] = stats::skewness(&samples);
                out[[i, base + 3]] = stats::kurtosis(&samples);
                out[[i, base + 4]] = stats::peak_to_peak(&samples);
                out[[i, base + 5]] = stats::median(&samples);
                out[[i, base + 6]] = stats::iqr(&samples);
            }
        }
        Ok(out)
    }
}
