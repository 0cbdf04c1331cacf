//! Spectral features: Welch power spectral density and canonical band
//! powers.

use std::f64::consts::PI;

use ndarray::{Array2, ArrayD};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{EegError, Result};
use crate::features::{instances, FeatureExtractor};

/// Welch PSD estimate: Hann-windowed segments with 50 % overlap, averaged
/// one-sided periodograms with density scaling. `nperseg` is capped at the
/// signal length. Returns `(frequencies, power)`.
pub fn welch(signal: &[f64], sfreq: f64, nperseg: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    if signal.is_empty() {
        return Err(EegError::Configuration(
            "cannot estimate a spectrum from an empty signal".to_string(),
        ));
    }
    if sfreq <= 0.0 {
        return Err(EegError::Configuration(format!(
            "sampling frequency must be positive, got {sfreq}"
        )));
    }
    let nperseg = nperseg.min(signal.len()).max(2);
    let step = (nperseg / 2).max(1);

    let window: Vec<f64> = (0..nperseg)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (nperseg - 1) as f64).cos()))
        .collect();
    let window_power: f64 = window.iter().map(|w| w * w).sum();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nperseg);

    let n_bins = nperseg / 2 + 1;
    let mut accumulated = vec![0.0; n_bins];
    let mut n_segments = 0usize;

    let mut start = 0;
    while start + nperseg <= signal.len() {
        let segment = &signal[start..start + nperseg];
        let seg_mean = segment.iter().sum::<f64>() / nperseg as f64;

        let mut buf: Vec<Complex<f64>> = segment
            .iter()
            .zip(&window)
            .map(|(&v, &w)| Complex::new((v - seg_mean) * w, 0.0))
            .collect();
        fft.process(&mut buf);

        for (k, bin) in buf[..n_bins].iter().enumerate() {
            // One-sided density: interior bins carry both spectrum halves.
            let two_sided_edge = k == 0 || (nperseg % 2 == 0 && k == n_bins - 1);
            let factor = if two_sided_edge { 1.0 } else { 2.0 };
            accumulated[k] += factor * bin.norm_sqr() / (sfreq * window_power);
        }
        n_segments += 1;
        start += step;
    }

    if n_segments == 0 {
        return Err(EegError::Configuration(format!(
            "signal of {} samples is shorter than one {nperseg}-sample segment",
            signal.len()
        )));
    }

    let freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sfreq / nperseg as f64)
        .collect();
    let psd: Vec<f64> = accumulated
        .iter()
        .map(|p| p / n_segments as f64)
        .collect();
    Ok((freqs, psd))
}

// ---------------------------------------------------------------------------
// psd extractor

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsdParams {
    pub sfreq: f64,
    #[serde(default = "default_fmin")]
    pub fmin: f64,
    #[serde(default = "default_fmax")]
    pub fmax: f64,
    #[serde(default = "default_nperseg")]
    pub nperseg: usize,
}

fn default_fmin() -> f64 {
    1.0
}

fn default_fmax() -> f64 {
    40.0
}

fn default_nperseg() -> usize {
    256
}

/// Per-channel Welch PSD restricted to `[fmin, fmax]`, concatenated across
/// channels.
#[derive(Debug, Clone)]
pub struct PsdExtractor {
    params: PsdParams,
}

impl PsdExtractor {
    pub fn new(sfreq: f64, fmin: f64, fmax: f64, nperseg: usize) -> Self {
        Self {
            params: PsdParams {
                sfreq,
                fmin,
                fmax,
                nperseg,
            },
        }
    }

    pub fn from_params(params: Value) -> Result<Self> {
        let params: PsdParams = serde_json::from_value(params)
            .map_err(|e| EegError::Configuration(format!("invalid psd parameters: {e}")))?;
        Ok(Self { params })
    }
}

impl FeatureExtractor for PsdExtractor {
    fn name(&self) -> &'static str {
        "psd"
    }

    fn params(&self) -> Value {
        json!({
            "sfreq": self.params.sfreq,
            "fmin": self.params.fmin,
            "fmax": self.params.fmax,
            "nperseg": self.params.nperseg,
        })
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<Array2<f64>> {
        let p = &self.params;
        let parts = instances(x)?;
        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(parts.len());

        for instance in &parts {
            let mut row = Vec::new();
            for channel in instance.rows() {
                let samples: Vec<f64> = channel.iter().copied().collect();
                let (freqs, psd) = welch(&samples, p.sfreq, p.nperseg)?;
                row.extend(
                    freqs
                        .iter()
                        .zip(&psd)
                        .filter(|(f, _)| **f >= p.fmin && **f <= p.fmax)
                        .map(|(_, v)| *v),
                );
            }
            rows.push(row);
        }

        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        let n_instances = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((n_instances, n_features), flat)
            .map_err(|e| EegError::ShapeMismatch(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// band power extractor

/// The canonical EEG frequency bands, in ascending order.
pub fn default_bands() -> Vec<(String, f64, f64)> {
    vec![
        ("delta".to_string(), 0.5, 4.0),
        ("theta".to_string(), 4.0, 8.0),
        ("alpha".to_string(), 8.0, 13.0),
        ("beta".to_string(), 13.0, 30.0),
        ("gamma".to_string(), 30.0, 45.0),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandPowerParams {
    pub sfreq: f64,
    /// `(name, low, high)` triples; order fixes the feature layout.
    #[serde(default = "default_bands")]
    pub bands: Vec<(String, f64, f64)>,
    #[serde(default = "default_nperseg")]
    pub nperseg: usize,
}

/// Per-channel integrated Welch PSD over each configured band
/// (trapezoidal rule), one feature per channel × band.
#[derive(Debug, Clone)]
pub struct BandPowerExtractor {
    params: BandPowerParams,
}

impl BandPowerExtractor {
    pub fn new(sfreq: f64, bands: Vec<(String, f64, f64)>, nperseg: usize) -> Self {
        Self {
            params: BandPowerParams {
                sfreq,
                bands,
                nperseg,
            },
        }
    }

    pub fn standard(sfreq: f64) -> Self {
        Self::new(sfreq, default_bands(), default_nperseg())
    }

    pub fn from_params(params: Value) -> Result<Self> {
        let params: BandPowerParams = serde_json::from_value(params)
            .map_err(|e| EegError::Configuration(format!("invalid band_power parameters: {e}")))?;
        Ok(Self { params })
    }
}

/// Trapezoidal integration of `values` over uniformly spaced `points`.
fn trapezoid(points: &[f64], values: &[f64]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .windows(2)
        .zip(values.windows(2))
        .map(|(f, p)| (f[1] - f[0]) * (p[0] + p[1]) / 2.0)
        .sum()
}

impl FeatureExtractor for BandPowerExtractor {
    fn name(&self) -> &'static str {
        "band_power"
    }

    fn params(&self) -> Value {
        json!({
            "sfreq": self.params.sfreq,
            "bands": self.params.bands,
            "nperseg": self.params.nperseg,
        })
    }

    fn transform(&self, x: &ArrayD<f64>) -> Result<Array2<f64>> {
        let p = &self.params;
        let parts = instances(x)?;
        let n_channels = x.shape()[0];
        let mut out = Array2::zeros((parts.len(), n_channels * p.bands.len()));

        for (i, instance) in parts.iter().enumerate() {
            for (c, channel) in instance.rows().into_iter().enumerate() {
                let samples: Vec<f64> = channel.iter().copied().collect();
                let (freqs, psd) = welch(&samples, p.sfreq, p.nperseg)?;
                for (b, (_, low, high)) in p.bands.iter().enumerate() {
                    let in_band: Vec<(f64, f64)> = freqs
                        .iter()
                        .zip(&psd)
                        .filter(|(f, _)| **f >= *low && **f <= *high)
                        .map(|(f, v)| (*f, *v))
                        .collect();
                    let band_freqs: Vec<f64> = in_band.iter().map(|(f, _)| *f).collect();
                    let band_psd: Vec<f64> = in_band.iter().map(|(_, v)| *v).collect();
                    out[[i, c * p.bands.len() + b]] = trapezoid(&band_freqs, &band_psd);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2 as A2;

    fn tone(freq: f64, sfreq: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sfreq).sin())
            .collect()
    }

    #[test]
    fn welch_peak_lands_on_the_tone_frequency() {
        let sfreq = 256.0;
        let signal = tone(10.0, sfreq, 2048);
        let (freqs, psd) = welch(&signal, sfreq, 256).unwrap();

        let peak = psd
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| freqs[i])
            .unwrap_or(0.0);
        assert!((peak - 10.0).abs() <= 1.0, "peak at {peak} Hz");
    }

    #[test]
    fn welch_caps_nperseg_at_signal_length() {
        let signal = tone(5.0, 100.0, 80);
        let (freqs, psd) = welch(&signal, 100.0, 256).unwrap();
        assert_eq!(freqs.len(), 80 / 2 + 1);
        assert_eq!(psd.len(), freqs.len());
    }

    #[test]
    fn psd_extractor_concatenates_channels() {
        let sfreq = 128.0;
        let x = A2::from_shape_fn((2, 512), |(c, t)| {
            (2.0 * PI * (8.0 + c as f64 * 4.0) * t as f64 / sfreq).sin()
        })
        .into_dyn();
        let extractor = PsdExtractor::new(sfreq, 1.0, 40.0, 128);
        let out = extractor.transform(&x).unwrap();
        assert_eq!(out.nrows(), 1);
        // Bins in [1, 40] Hz at df = 1 Hz, per channel.
        assert_eq!(out.ncols(), 2 * 40);
    }

    #[test]
    fn alpha_tone_concentrates_power_in_the_alpha_band() {
        let sfreq = 256.0;
        let x = A2::from_shape_fn((1, 2048), |(_, t)| {
            (2.0 * PI * 10.0 * t as f64 / sfreq).sin()
        })
        .into_dyn();
        let extractor = BandPowerExtractor::standard(sfreq);
        let out = extractor.transform(&x).unwrap();
        assert_eq!(out.dim(), (1, 5));

        let alpha = out[[0, 2]];
        for (b, name) in ["delta", "theta", "beta", "gamma"].iter().enumerate() {
            let other = out[[0, if b < 2 { b } else { b + 1 }]];
            assert!(
                alpha > other * 10.0,
                "alpha power {alpha} not dominant over {name} ({other})"
            );
        }
    }

    #[test]
    fn band_power_params_round_trip() {
        let extractor = BandPowerExtractor::standard(256.0);
        let rebuilt = BandPowerExtractor::from_params(extractor.params()).unwrap();
        assert_eq!(extractor.params(), rebuilt.params());
    }
}
