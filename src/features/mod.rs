//! Feature extraction: transform-like operations producing a flat
//! instances × features matrix from a sample.

pub mod spectral;
pub mod stats;
pub mod time_domain;

use ndarray::{Array2, ArrayD, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EegError, Result};

pub use spectral::{BandPowerExtractor, PsdExtractor};
pub use time_domain::TimeDomainExtractor;

/// Serialized form of an extractor, persisted with feature records for
/// provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub name: String,
    pub params: Value,
}

/// A feature extractor maps a (possibly epoched) recording to one flat
/// feature row per instance: a 2-D input is a single instance, a 3-D
/// (channels, epochs, window) input yields one instance per epoch.
pub trait FeatureExtractor {
    fn name(&self) -> &'static str;

    fn params(&self) -> Value;

    fn fit(&mut self, _x: &ArrayD<f64>, _y: Option<&[i64]>) -> Result<()> {
        Ok(())
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<Array2<f64>>;

    fn fit_transform(&mut self, x: &ArrayD<f64>, y: Option<&[i64]>) -> Result<Array2<f64>> {
        self.fit(x, y)?;
        self.transform(x)
    }

    fn to_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            name: self.name().to_string(),
            params: self.params(),
        }
    }
}

/// Reconstruct an extractor from its serialized `{name, params}` form.
pub fn build_extractor(config: &ExtractorConfig) -> Result<Box<dyn FeatureExtractor>> {
    let params = config.params.clone();
    let extractor: Box<dyn FeatureExtractor> = match config.name.as_str() {
        "time_domain" => Box::new(TimeDomainExtractor::new()),
        "psd" => Box::new(PsdExtractor::from_params(params)?),
        "band_power" => Box::new(BandPowerExtractor::from_params(params)?),
        other => return Err(EegError::UnknownExtractor(other.to_string())),
    };
    Ok(extractor)
}

/// Split a recording into per-instance (channels × time) matrices.
///
/// 2-D input is one instance; 3-D input contributes one instance per epoch.
pub(crate) fn instances(x: &ArrayD<f64>) -> Result<Vec<Array2<f64>>> {
    match x.ndim() {
        2 => {
            let matrix = x
                .clone()
                .into_dimensionality::<ndarray::Ix2>()
                .map_err(|e| EegError::ShapeMismatch(e.to_string()))?;
            Ok(vec![matrix])
        }
        3 => {
            let n_epochs = x.shape()[1];
            let mut out = Vec::with_capacity(n_epochs);
            for e in 0..n_epochs {
                let epoch = x.index_axis(Axis(1), e).to_owned();
                let matrix = epoch
                    .into_dimensionality::<ndarray::Ix2>()
                    .map_err(|err| EegError::ShapeMismatch(err.to_string()))?;
                out.push(matrix);
            }
            Ok(out)
        }
        ndim => Err(EegError::ShapeMismatch(format!(
            "feature extraction expects 2-D or 3-D input, got {ndim}-D"
        ))),
    }
}

/// Column-wise composition of feature matrices from several extractors.
///
/// All matrices must agree on the instance (row) count; a disagreement is a
/// `ShapeMismatch`, not a silent truncation.
pub fn compose_features(outputs: &[Array2<f64>]) -> Result<Array2<f64>> {
    let first = outputs
        .first()
        .ok_or_else(|| EegError::ShapeMismatch("no feature matrices to compose".to_string()))?;
    let n_instances = first.nrows();
    for (i, matrix) in outputs.iter().enumerate() {
        if matrix.nrows() != n_instances {
            return Err(EegError::ShapeMismatch(format!(
                "extractor #{i} produced {} instances, expected {n_instances}",
                matrix.nrows()
            )));
        }
    }
    let views: Vec<_> = outputs.iter().map(|m| m.view()).collect();
    ndarray::concatenate(Axis(1), &views)
        .map_err(|e| EegError::ShapeMismatch(format!("feature concatenation failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use serde_json::json;

    #[test]
    fn epoched_input_yields_one_instance_per_epoch() {
        let x = Array3::from_shape_fn((2, 5, 16), |(c, e, t)| (c * 1000 + e * 100 + t) as f64)
            .into_dyn();
        let parts = instances(&x).unwrap();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0].dim(), (2, 16));
        assert_eq!(parts[3][[1, 2]], x[[1, 3, 2]]);
    }

    #[test]
    fn compose_concatenates_columns() {
        let a = Array2::from_elem((4, 3), 1.0);
        let b = Array2::from_elem((4, 2), 2.0);
        let out = compose_features(&[a, b]).unwrap();
        assert_eq!(out.dim(), (4, 5));
        assert_eq!(out[[0, 2]], 1.0);
        assert_eq!(out[[0, 3]], 2.0);
    }

    #[test]
    fn compose_rejects_instance_count_mismatch() {
        let a = Array2::from_elem((4, 3), 1.0);
        let b = Array2::from_elem((5, 3), 2.0);
        assert!(matches!(
            compose_features(&[a, b]),
            Err(EegError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn registry_rejects_unknown_extractor() {
        let config = ExtractorConfig {
            name: "wavelet_energy".to_string(),
            params: json!({}),
        };
        assert!(matches!(
            build_extractor(&config),
            Err(EegError::UnknownExtractor(_))
        ));
    }

    #[test]
    fn registry_builds_known_extractors() {
        for (name, params) in [
            ("time_domain", json!({})),
            ("psd", json!({ "sfreq": 256.0 })),
            ("band_power", json!({ "sfreq": 256.0 })),
        ] {
            let config = ExtractorConfig {
                name: name.to_string(),
                params,
            };
            let extractor = build_extractor(&config).unwrap();
            assert_eq!(extractor.name(), name);
        }
    }
}
