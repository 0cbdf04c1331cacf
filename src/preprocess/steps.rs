//! The concrete transform steps behind the pipeline registry.
//!
//! Every step keeps the channel axis intact and operates along the time
//! (last) axis; only `epoching` changes the dimensionality, reshaping a
//! continuous recording into fixed-length windows.

use ndarray::{Array3, ArrayD, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{EegError, Result};
use crate::preprocess::filters::{design_bandpass, design_notch, filtfilt};
use crate::preprocess::ica;
use crate::preprocess::map_time_lanes;
use crate::preprocess::resample::{output_length, resample_lane};
use crate::preprocess::Transform;

/// Guards divisions by the spread/deviation of constant channels.
const EPSILON: f64 = 1e-8;

fn bad_params(name: &str, err: serde_json::Error) -> EegError {
    EegError::Configuration(format!("invalid parameters for step '{name}': {err}"))
}

/// Apply `f` to every time lane in parallel, preserving lane order.
fn par_map_time_lanes<F>(x: &ArrayD<f64>, out_len: usize, f: F) -> Result<ArrayD<f64>>
where
    F: Fn(&[f64]) -> Result<Vec<f64>> + Sync,
{
    let time_axis = Axis(x.ndim() - 1);
    let lanes: Vec<Vec<f64>> = x
        .lanes(time_axis)
        .into_iter()
        .map(|lane| lane.iter().copied().collect())
        .collect();
    let processed: Vec<Vec<f64>> = lanes
        .par_iter()
        .map(|lane| f(lane))
        .collect::<Result<Vec<_>>>()?;

    let mut iter = processed.into_iter();
    map_time_lanes(x, out_len, move |_| {
        iter.next()
            .ok_or_else(|| EegError::Computation("lane count changed mid-transform".to_string()))
    })
}

// ---------------------------------------------------------------------------
// bandpass

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandpassParams {
    /// Low cutoff in Hz.
    pub low: f64,
    /// High cutoff in Hz.
    pub high: f64,
    /// Sampling rate of the incoming data in Hz.
    pub sfreq: f64,
    #[serde(default = "default_filter_order")]
    pub order: usize,
}

fn default_filter_order() -> usize {
    5
}

/// Zero-phase Butterworth band-pass along the time axis.
#[derive(Debug, Clone)]
pub struct BandpassStep {
    params: BandpassParams,
}

impl BandpassStep {
    pub fn new(low: f64, high: f64, sfreq: f64, order: usize) -> Self {
        Self {
            params: BandpassParams {
                low,
                high,
                sfreq,
                order,
            },
        }
    }

    pub fn from_params(params: Value) -> Result<Self> {
        let params: BandpassParams =
            serde_json::from_value(params).map_err(|e| bad_params("bandpass", e))?;
        Ok(Self { params })
    }
}

impl Transform for BandpassStep {
    fn name(&self) -> &'static str {
        "bandpass"
    }

    fn params(&self) -> Value {
        json!({
            "low": self.params.low,
            "high": self.params.high,
            "sfreq": self.params.sfreq,
            "order": self.params.order,
        })
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let p = &self.params;
        let cascade = design_bandpass(p.low, p.high, p.sfreq, p.order)?;
        let n = *x.shape().last().unwrap_or(&0);
        par_map_time_lanes(x, n, |lane| Ok(filtfilt(&cascade, lane)))
    }
}

// ---------------------------------------------------------------------------
// notch

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotchParams {
    /// Center frequency to reject, in Hz.
    pub freq: f64,
    pub sfreq: f64,
    #[serde(default = "default_notch_q")]
    pub q: f64,
}

fn default_notch_q() -> f64 {
    30.0
}

/// Zero-phase narrow notch along the time axis.
#[derive(Debug, Clone)]
pub struct NotchStep {
    params: NotchParams,
}

impl NotchStep {
    pub fn new(freq: f64, sfreq: f64, q: f64) -> Self {
        Self {
            params: NotchParams { freq, sfreq, q },
        }
    }

    pub fn from_params(params: Value) -> Result<Self> {
        let params: NotchParams =
            serde_json::from_value(params).map_err(|e| bad_params("notch", e))?;
        Ok(Self { params })
    }
}

impl Transform for NotchStep {
    fn name(&self) -> &'static str {
        "notch"
    }

    fn params(&self) -> Value {
        json!({
            "freq": self.params.freq,
            "sfreq": self.params.sfreq,
            "q": self.params.q,
        })
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let p = &self.params;
        let cascade = design_notch(p.freq, p.sfreq, p.q)?;
        let n = *x.shape().last().unwrap_or(&0);
        par_map_time_lanes(x, n, |lane| Ok(filtfilt(&cascade, lane)))
    }
}

// ---------------------------------------------------------------------------
// resample

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResampleParams {
    pub target_rate: f64,
    pub orig_rate: f64,
}

/// FFT resampling along the time axis; output length is
/// `round(n * target_rate / orig_rate)`.
#[derive(Debug, Clone)]
pub struct ResampleStep {
    params: ResampleParams,
}

impl ResampleStep {
    pub fn new(target_rate: f64, orig_rate: f64) -> Self {
        Self {
            params: ResampleParams {
                target_rate,
                orig_rate,
            },
        }
    }

    pub fn from_params(params: Value) -> Result<Self> {
        let params: ResampleParams =
            serde_json::from_value(params).map_err(|e| bad_params("resample", e))?;
        Ok(Self { params })
    }

    pub fn target_rate(&self) -> f64 {
        self.params.target_rate
    }
}

impl Transform for ResampleStep {
    fn name(&self) -> &'static str {
        "resample"
    }

    fn params(&self) -> Value {
        json!({
            "target_rate": self.params.target_rate,
            "orig_rate": self.params.orig_rate,
        })
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let p = &self.params;
        if p.target_rate <= 0.0 || p.orig_rate <= 0.0 {
            return Err(EegError::Configuration(format!(
                "resample rates must be positive, got target {} Hz / orig {} Hz",
                p.target_rate, p.orig_rate
            )));
        }
        let n = *x.shape().last().unwrap_or(&0);
        let out_len = output_length(n, p.target_rate, p.orig_rate);
        par_map_time_lanes(x, out_len, |lane| {
            resample_lane(lane, p.target_rate, p.orig_rate)
        })
    }
}

// ---------------------------------------------------------------------------
// normalize

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMethod {
    Zscore,
    Minmax,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeParams {
    pub method: NormalizeMethod,
}

/// Per-channel normalization along the time axis.
#[derive(Debug, Clone)]
pub struct NormalizeStep {
    params: NormalizeParams,
}

impl NormalizeStep {
    pub fn new(method: NormalizeMethod) -> Self {
        Self {
            params: NormalizeParams { method },
        }
    }

    pub fn from_params(params: Value) -> Result<Self> {
        let params: NormalizeParams =
            serde_json::from_value(params).map_err(|e| bad_params("normalize", e))?;
        Ok(Self { params })
    }
}

impl Transform for NormalizeStep {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn params(&self) -> Value {
        let method = match self.params.method {
            NormalizeMethod::Zscore => "zscore",
            NormalizeMethod::Minmax => "minmax",
        };
        json!({ "method": method })
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let n = *x.shape().last().unwrap_or(&0);
        let method = self.params.method;
        map_time_lanes(x, n, move |lane| {
            let out = match method {
                NormalizeMethod::Zscore => {
                    let mean = lane.iter().sum::<f64>() / lane.len() as f64;
                    let var =
                        lane.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / lane.len() as f64;
                    let std = var.sqrt();
                    lane.iter().map(|v| (v - mean) / (std + EPSILON)).collect()
                }
                NormalizeMethod::Minmax => {
                    let min = lane.iter().cloned().fold(f64::INFINITY, f64::min);
                    let max = lane.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    lane.iter().map(|v| (v - min) / (max - min + EPSILON)).collect()
                }
            };
            Ok(out)
        })
    }
}

// ---------------------------------------------------------------------------
// rereference

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMethod {
    /// Subtract the instantaneous mean of all channels.
    Average,
    /// Subtract the mean of the first two channels (mastoid pair).
    Mastoid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RereferenceParams {
    pub method: ReferenceMethod,
}

#[derive(Debug, Clone)]
pub struct RereferenceStep {
    params: RereferenceParams,
}

impl RereferenceStep {
    pub fn new(method: ReferenceMethod) -> Self {
        Self {
            params: RereferenceParams { method },
        }
    }

    pub fn from_params(params: Value) -> Result<Self> {
        let params: RereferenceParams =
            serde_json::from_value(params).map_err(|e| bad_params("rereference", e))?;
        Ok(Self { params })
    }
}

impl Transform for RereferenceStep {
    fn name(&self) -> &'static str {
        "rereference"
    }

    fn params(&self) -> Value {
        let method = match self.params.method {
            ReferenceMethod::Average => "average",
            ReferenceMethod::Mastoid => "mastoid",
        };
        json!({ "method": method })
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let n_channels = x.shape()[0];
        if n_channels == 0 {
            return Err(EegError::Configuration(
                "cannot re-reference a recording with no channels".to_string(),
            ));
        }
        let reference = match self.params.method {
            ReferenceMethod::Average => x
                .mean_axis(Axis(0))
                .ok_or_else(|| EegError::Computation("channel mean failed".to_string()))?,
            ReferenceMethod::Mastoid => {
                if n_channels < 2 {
                    return Err(EegError::Configuration(
                        "mastoid re-referencing requires at least 2 channels".to_string(),
                    ));
                }
                let a = x.index_axis(Axis(0), 0);
                let b = x.index_axis(Axis(0), 1);
                (&a + &b) / 2.0
            }
        };
        Ok(x - &reference.insert_axis(Axis(0)))
    }
}

// ---------------------------------------------------------------------------
// ica

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcaParams {
    #[serde(default = "default_ica_components")]
    pub n_components: usize,
    #[serde(default = "default_ica_seed")]
    pub random_state: u64,
}

fn default_ica_components() -> usize {
    15
}

fn default_ica_seed() -> u64 {
    42
}

/// FastICA decomposition and rank-limited reconstruction.
///
/// The fitted unmixing state lives only inside a single transform call; it
/// is never carried across runs or serialized with the pipeline.
#[derive(Debug, Clone)]
pub struct IcaStep {
    params: IcaParams,
}

impl IcaStep {
    pub fn new(n_components: usize, random_state: u64) -> Self {
        Self {
            params: IcaParams {
                n_components,
                random_state,
            },
        }
    }

    pub fn from_params(params: Value) -> Result<Self> {
        let params: IcaParams = serde_json::from_value(params).map_err(|e| bad_params("ica", e))?;
        Ok(Self { params })
    }
}

impl Transform for IcaStep {
    fn name(&self) -> &'static str {
        "ica"
    }

    fn params(&self) -> Value {
        json!({
            "n_components": self.params.n_components,
            "random_state": self.params.random_state,
        })
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let x2 = x
            .clone()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|_| {
                EegError::Configuration(
                    "ica requires a continuous 2-D (channels, time) input; run it before epoching"
                        .to_string(),
                )
            })?;
        let cleaned = ica::reconstruct(&x2, self.params.n_components, self.params.random_state)?;
        Ok(cleaned.into_dyn())
    }
}

// ---------------------------------------------------------------------------
// epoching

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochingParams {
    pub sfreq: f64,
    /// Window length in seconds.
    #[serde(default = "default_epoch_length")]
    pub epoch_length: f64,
}

fn default_epoch_length() -> f64 {
    2.0
}

/// Split a continuous recording into fixed-length non-overlapping windows:
/// (channels, time) → (channels, epochs, window). Trailing samples that do
/// not fill a whole window are discarded.
#[derive(Debug, Clone)]
pub struct EpochingStep {
    params: EpochingParams,
}

impl EpochingStep {
    pub fn new(sfreq: f64, epoch_length: f64) -> Self {
        Self {
            params: EpochingParams {
                sfreq,
                epoch_length,
            },
        }
    }

    pub fn from_params(params: Value) -> Result<Self> {
        let params: EpochingParams =
            serde_json::from_value(params).map_err(|e| bad_params("epoching", e))?;
        Ok(Self { params })
    }
}

impl Transform for EpochingStep {
    fn name(&self) -> &'static str {
        "epoching"
    }

    fn params(&self) -> Value {
        json!({
            "sfreq": self.params.sfreq,
            "epoch_length": self.params.epoch_length,
        })
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        if x.ndim() != 2 {
            return Err(EegError::Configuration(
                "epoching expects a continuous 2-D (channels, time) input".to_string(),
            ));
        }
        let n_channels = x.shape()[0];
        let n_samples = x.shape()[1];
        let window = (self.params.sfreq * self.params.epoch_length) as usize;
        if window == 0 {
            return Err(EegError::Configuration(format!(
                "epoch window of {} s at {} Hz is shorter than one sample",
                self.params.epoch_length, self.params.sfreq
            )));
        }
        if window > n_samples {
            return Err(EegError::Configuration(format!(
                "epoch window ({window} samples) exceeds the signal length ({n_samples} samples)"
            )));
        }

        let n_epochs = n_samples / window;
        let epoched = Array3::from_shape_fn((n_channels, n_epochs, window), |(c, e, t)| {
            x[[c, e * window + t]]
        });
        Ok(epoched.into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use std::f64::consts::PI;

    fn two_channel(n: usize) -> ArrayD<f64> {
        Array2::from_shape_fn((2, n), |(c, t)| {
            let t = t as f64 / 100.0;
            (2.0 * PI * (4.0 + c as f64) * t).sin() + c as f64
        })
        .into_dyn()
    }

    #[test]
    fn epoching_drops_trailing_samples() {
        let x = Array2::<f64>::from_shape_fn((1, 1025), |(_, t)| t as f64).into_dyn();
        let step = EpochingStep::new(100.0, 1.0);
        let out = step.transform(&x).unwrap();
        assert_eq!(out.shape(), &[1, 10, 100]);
        // First sample of the third window is sample 200 of the input.
        assert_eq!(out[[0, 2, 0]], 200.0);
    }

    #[test]
    fn epoching_rejects_window_longer_than_signal() {
        let x = Array2::<f64>::zeros((1, 50)).into_dyn();
        let step = EpochingStep::new(100.0, 1.0);
        assert!(matches!(
            step.transform(&x),
            Err(EegError::Configuration(_))
        ));
    }

    #[test]
    fn zscore_centers_and_scales_each_channel() {
        let step = NormalizeStep::new(NormalizeMethod::Zscore);
        let out = step.transform(&two_channel(1000)).unwrap();
        for c in 0..2 {
            let lane: Vec<f64> = (0..1000).map(|t| out[[c, t]]).collect();
            let mean = lane.iter().sum::<f64>() / 1000.0;
            let std =
                (lane.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 1000.0).sqrt();
            assert!(mean.abs() < 1e-6, "channel {c} mean {mean}");
            assert!((std - 1.0).abs() < 1e-3, "channel {c} std {std}");
        }
    }

    #[test]
    fn minmax_bounds_each_channel_to_unit_interval() {
        let step = NormalizeStep::new(NormalizeMethod::Minmax);
        let out = step.transform(&two_channel(512)).unwrap();
        for &v in out.iter() {
            assert!((0.0..=1.0).contains(&v), "value {v} outside [0, 1]");
        }
    }

    #[test]
    fn minmax_constant_channel_degenerates_to_zero() {
        let x = Array2::from_elem((1, 64), 7.5).into_dyn();
        let step = NormalizeStep::new(NormalizeMethod::Minmax);
        let out = step.transform(&x).unwrap();
        for &v in out.iter() {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn normalize_applies_per_epoch_on_3d_input() {
        let x = Array3::from_shape_fn((2, 3, 50), |(c, e, t)| {
            (c * 100 + e * 10) as f64 + (t as f64 * 0.3).sin()
        })
        .into_dyn();
        let step = NormalizeStep::new(NormalizeMethod::Minmax);
        let out = step.transform(&x).unwrap();
        assert_eq!(out.shape(), &[2, 3, 50]);
        for &v in out.iter() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn average_reference_zeroes_the_channel_mean() {
        let step = RereferenceStep::new(ReferenceMethod::Average);
        let out = step.transform(&two_channel(256)).unwrap();
        for t in 0..256 {
            let mean = (out[[0, t]] + out[[1, t]]) / 2.0;
            assert!(mean.abs() < 1e-12);
        }
    }

    #[test]
    fn mastoid_reference_needs_two_channels() {
        let x = Array2::<f64>::zeros((1, 100)).into_dyn();
        let step = RereferenceStep::new(ReferenceMethod::Mastoid);
        assert!(matches!(
            step.transform(&x),
            Err(EegError::Configuration(_))
        ));
    }

    #[test]
    fn resample_step_halves_the_time_axis() {
        let x = two_channel(1000);
        let step = ResampleStep::new(128.0, 256.0);
        let out = step.transform(&x).unwrap();
        assert_eq!(out.shape(), &[2, 500]);
    }

    #[test]
    fn bandpass_step_rejects_high_edge_at_nyquist() {
        let x = two_channel(512);
        let step = BandpassStep::new(8.0, 128.0, 256.0, 4);
        assert!(matches!(
            step.transform(&x),
            Err(EegError::Configuration(_))
        ));
    }

    #[test]
    fn bandpass_step_preserves_shape() {
        let x = two_channel(512);
        let step = BandpassStep::new(1.0, 40.0, 100.0, 4);
        let out = step.transform(&x).unwrap();
        assert_eq!(out.shape(), x.shape());
    }

    #[test]
    fn ica_step_rejects_epoched_input() {
        let x = Array3::<f64>::zeros((2, 4, 50)).into_dyn();
        let step = IcaStep::new(2, 42);
        assert!(matches!(
            step.transform(&x),
            Err(EegError::Configuration(_))
        ));
    }

    #[test]
    fn step_params_round_trip_through_from_params() {
        let step = BandpassStep::new(0.5, 45.0, 256.0, 5);
        let rebuilt = BandpassStep::from_params(step.params()).unwrap();
        assert_eq!(step.params(), rebuilt.params());

        let step = NotchStep::new(50.0, 256.0, 30.0);
        let rebuilt = NotchStep::from_params(step.params()).unwrap();
        assert_eq!(step.params(), rebuilt.params());

        let step = NormalizeStep::new(NormalizeMethod::Minmax);
        let rebuilt = NormalizeStep::from_params(step.params()).unwrap();
        assert_eq!(step.params(), rebuilt.params());
    }

    #[test]
    fn missing_required_param_is_a_configuration_error() {
        let err = BandpassStep::from_params(json!({ "low": 1.0 })).unwrap_err();
        assert!(matches!(err, EegError::Configuration(_)));
    }
}
