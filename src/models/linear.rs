//! Built-in linear backend: a JSON parameter file holding a weight matrix
//! and bias vector, predicting by argmax over class scores.

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{EegError, Result};
use crate::models::Model;

/// Persisted parameters: `weights[class][feature]`, one bias per class, and
/// optional class labels to map argmax indices back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearParams {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub classes: Option<Vec<i64>>,
}

#[derive(Debug, Clone)]
pub struct LinearModel {
    name: String,
    params: Option<LinearParams>,
}

impl LinearModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: None,
        }
    }

    fn loaded(&self) -> Result<&LinearParams> {
        self.params.as_ref().ok_or_else(|| {
            EegError::Configuration(format!("linear model '{}' has no parameters loaded", self.name))
        })
    }
}

impl Model for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let params: LinearParams = serde_json::from_str(&text)?;

        if params.weights.is_empty() {
            return Err(EegError::Configuration(
                "linear model weight matrix is empty".to_string(),
            ));
        }
        let n_features = params.weights[0].len();
        if params.weights.iter().any(|row| row.len() != n_features) {
            return Err(EegError::Configuration(
                "linear model weight rows have inconsistent lengths".to_string(),
            ));
        }
        if params.bias.len() != params.weights.len() {
            return Err(EegError::Configuration(format!(
                "linear model has {} bias terms for {} classes",
                params.bias.len(),
                params.weights.len()
            )));
        }
        if let Some(classes) = &params.classes {
            if classes.len() != params.weights.len() {
                return Err(EegError::Configuration(format!(
                    "linear model lists {} class labels for {} weight rows",
                    classes.len(),
                    params.weights.len()
                )));
            }
        }

        self.params = Some(params);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        let params = self.loaded()?;
        let n_features = params.weights[0].len();
        if x.ncols() != n_features {
            return Err(EegError::ShapeMismatch(format!(
                "input has {} features, model expects {n_features}",
                x.ncols()
            )));
        }

        let predictions = x
            .rows()
            .into_iter()
            .map(|row| {
                let (best, _) = params
                    .weights
                    .iter()
                    .zip(&params.bias)
                    .map(|(w, b)| w.iter().zip(row.iter()).map(|(wi, xi)| wi * xi).sum::<f64>() + b)
                    .enumerate()
                    .fold((0usize, f64::NEG_INFINITY), |acc, (i, score)| {
                        if score > acc.1 {
                            (i, score)
                        } else {
                            acc
                        }
                    });
                match &params.classes {
                    Some(classes) => classes[best] as f64,
                    None => best as f64,
                }
            })
            .collect();
        Ok(predictions)
    }

    fn info(&self) -> Value {
        match &self.params {
            Some(params) => json!({
                "name": self.name,
                "type": "linear",
                "loaded": true,
                "n_classes": params.weights.len(),
                "n_features": params.weights[0].len(),
            }),
            None => json!({
                "name": self.name,
                "type": "linear",
                "loaded": false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn write_params(dir: &Path, params: &Value) -> std::path::PathBuf {
        let path = dir.join("weights.json");
        std::fs::write(&path, serde_json::to_string(params).expect("encode")).expect("write");
        path
    }

    #[test]
    fn argmax_prediction_with_class_labels() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_params(
            dir.path(),
            &json!({
                "weights": [[1.0, 0.0], [0.0, 1.0]],
                "bias": [0.0, 0.0],
                "classes": [3, 7],
            }),
        );

        let mut model = LinearModel::new("demo");
        model.load(&path).unwrap();

        let x = arr2(&[[2.0, 0.5], [0.1, 4.0]]);
        assert_eq!(model.predict(&x).unwrap(), vec![3.0, 7.0]);
        assert_eq!(model.info()["n_features"], json!(2));
    }

    #[test]
    fn predict_before_load_is_an_error() {
        let model = LinearModel::new("unloaded");
        let x = arr2(&[[1.0]]);
        assert!(model.predict(&x).is_err());
        assert_eq!(model.info()["loaded"], json!(false));
    }

    #[test]
    fn load_rejects_inconsistent_shapes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_params(
            dir.path(),
            &json!({ "weights": [[1.0, 2.0]], "bias": [0.0, 1.0] }),
        );
        let mut model = LinearModel::new("bad");
        assert!(matches!(
            model.load(&path),
            Err(EegError::Configuration(_))
        ));
    }

    #[test]
    fn feature_count_mismatch_is_a_shape_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_params(
            dir.path(),
            &json!({ "weights": [[1.0, 2.0, 3.0]], "bias": [0.0] }),
        );
        let mut model = LinearModel::new("m");
        model.load(&path).unwrap();
        let x = arr2(&[[1.0, 2.0]]);
        assert!(matches!(
            model.predict(&x),
            Err(EegError::ShapeMismatch(_))
        ));
    }
}
