//! Signal preprocessing: transform steps, filter designs, and the pipeline
//! that composes them.

pub mod filters;
pub mod ica;
pub mod pipeline;
pub mod resample;
pub mod steps;

use ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use pipeline::{build_step, Pipeline, PipelineConfig};
pub use steps::{
    BandpassStep, EpochingStep, IcaStep, NormalizeMethod, NormalizeStep, NotchStep,
    ReferenceMethod, RereferenceStep, ResampleStep,
};

/// Serialized form of a single step: the registry key plus the parameter
/// mapping that fully determines its behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    pub params: Value,
}

/// A single named, parameterized signal operation.
///
/// `x` is channels-major with time as the last axis. Steps are pure
/// functions of their parameters and input; any fitted state (e.g. an ICA
/// decomposition) lives only between one `fit`/`transform` pair and is never
/// serialized with the step.
pub trait Transform {
    /// Stable registry key.
    fn name(&self) -> &'static str;

    /// Parameter mapping; `StepConfig { name, params }` round-trips through
    /// [`build_step`](pipeline::build_step) into an equivalent step.
    fn params(&self) -> Value;

    /// Fit on the input. The default is a no-op for stateless steps.
    fn fit(&mut self, _x: &ArrayD<f64>, _y: Option<&[i64]>) -> Result<()> {
        Ok(())
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>>;

    fn fit_transform(&mut self, x: &ArrayD<f64>, y: Option<&[i64]>) -> Result<ArrayD<f64>> {
        self.fit(x, y)?;
        self.transform(x)
    }

    fn to_config(&self) -> StepConfig {
        StepConfig {
            name: self.name().to_string(),
            params: self.params(),
        }
    }
}

/// Apply `f` to every time lane (the last axis) of `x`, producing an array
/// whose last axis has length `out_len`.
///
/// Lanes are visited in row-major order for both input and output, so the
/// channel (and epoch) structure is preserved exactly.
pub(crate) fn map_time_lanes<F>(x: &ArrayD<f64>, out_len: usize, mut f: F) -> Result<ArrayD<f64>>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>>,
{
    if x.ndim() == 0 {
        return Err(crate::error::EegError::ShapeMismatch(
            "cannot map time lanes of a 0-dimensional array".to_string(),
        ));
    }
    let time_axis = Axis(x.ndim() - 1);
    let mut shape = x.shape().to_vec();
    if let Some(last) = shape.last_mut() {
        *last = out_len;
    }
    let mut out = ArrayD::<f64>::zeros(IxDyn(&shape));

    for (lane, mut out_lane) in x.lanes(time_axis).into_iter().zip(out.lanes_mut(time_axis)) {
        let input: Vec<f64> = lane.iter().copied().collect();
        let produced = f(&input)?;
        debug_assert_eq!(produced.len(), out_len);
        for (dst, src) in out_lane.iter_mut().zip(produced) {
            *dst = src;
        }
    }
    Ok(out)
}
