//! IIR filter design and zero-phase application.
//!
//! Filters are built as cascades of second-order sections (biquads) for
//! numerical stability: Butterworth lowpass/highpass/bandpass via bilinear
//! transform, and a narrow notch from its analog prototype. Pipeline steps
//! apply them zero-phase (one forward pass, one time-reversed pass) so the
//! filtered signal has no phase lag.

use std::f64::consts::PI;

use crate::error::{EegError, Result};

/// Coefficients of one second-order section.
/// H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)
#[derive(Debug, Clone, Copy)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

/// One biquad section with Direct Form II Transposed state.
#[derive(Debug, Clone)]
struct BiquadSection {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
}

impl BiquadSection {
    fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    fn step(&mut self, input: f64) -> f64 {
        let c = &self.coeffs;
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }
}

/// Cascade of second-order sections.
#[derive(Debug, Clone)]
pub struct SosCascade {
    sections: Vec<BiquadSection>,
    gain: f64,
}

impl SosCascade {
    pub fn new(coeffs: Vec<BiquadCoeffs>, gain: f64) -> Self {
        Self {
            sections: coeffs.into_iter().map(BiquadSection::new).collect(),
            gain,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let mut out = input * self.gain;
        for section in &mut self.sections {
            out = section.step(out);
        }
        out
    }

    pub fn process_signal(&mut self, signal: &mut [f64]) {
        for sample in signal.iter_mut() {
            *sample = self.process(*sample);
        }
    }

    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.z1 = 0.0;
            section.z2 = 0.0;
        }
    }
}

fn prewarp(freq: f64, sfreq: f64) -> f64 {
    (PI * freq / sfreq).tan()
}

/// Butterworth lowpass second-order sections from the prewarped cutoff.
fn lowpass_sections(wn: f64, order: usize) -> Vec<BiquadCoeffs> {
    let num_sections = (order + 1) / 2;
    let mut sections = Vec::with_capacity(num_sections);

    for k in 0..num_sections {
        if order % 2 == 1 && k == num_sections - 1 {
            // Odd order: final first-order section, H(s) = wn / (s + wn).
            let g = wn / (1.0 + wn);
            sections.push(BiquadCoeffs {
                b0: g,
                b1: g,
                b2: 0.0,
                a1: (wn - 1.0) / (wn + 1.0),
                a2: 0.0,
            });
        } else {
            let theta = PI * (2.0 * k as f64 + 1.0) / (2.0 * order as f64);
            let alpha = -2.0 * theta.cos();
            let wn2 = wn * wn;
            let denom = 1.0 + alpha * wn + wn2;
            sections.push(BiquadCoeffs {
                b0: wn2 / denom,
                b1: 2.0 * wn2 / denom,
                b2: wn2 / denom,
                a1: 2.0 * (wn2 - 1.0) / denom,
                a2: (1.0 - alpha * wn + wn2) / denom,
            });
        }
    }
    sections
}

/// Butterworth highpass second-order sections from the prewarped cutoff.
fn highpass_sections(wn: f64, order: usize) -> Vec<BiquadCoeffs> {
    let num_sections = (order + 1) / 2;
    let mut sections = Vec::with_capacity(num_sections);

    for k in 0..num_sections {
        if order % 2 == 1 && k == num_sections - 1 {
            let g = 1.0 / (1.0 + wn);
            sections.push(BiquadCoeffs {
                b0: g,
                b1: -g,
                b2: 0.0,
                a1: (wn - 1.0) / (wn + 1.0),
                a2: 0.0,
            });
        } else {
            let theta = PI * (2.0 * k as f64 + 1.0) / (2.0 * order as f64);
            let alpha = -2.0 * theta.cos();
            let wn2 = wn * wn;
            let denom = 1.0 + alpha * wn + wn2;
            sections.push(BiquadCoeffs {
                b0: 1.0 / denom,
                b1: -2.0 / denom,
                b2: 1.0 / denom,
                a1: 2.0 * (wn2 - 1.0) / denom,
                a2: (1.0 - alpha * wn + wn2) / denom,
            });
        }
    }
    sections
}

/// Design a Butterworth band-pass as a highpass/lowpass cascade.
///
/// Requires `0 < low < high < sfreq / 2`.
pub fn design_bandpass(low: f64, high: f64, sfreq: f64, order: usize) -> Result<SosCascade> {
    let nyquist = sfreq / 2.0;
    if low <= 0.0 {
        return Err(EegError::Configuration(format!(
            "band-pass low cutoff must be positive, got {low} Hz"
        )));
    }
    if low >= high {
        return Err(EegError::Configuration(format!(
            "band-pass low cutoff ({low} Hz) must be below the high cutoff ({high} Hz)"
        )));
    }
    if high >= nyquist {
        return Err(EegError::Configuration(format!(
            "band-pass high cutoff ({high} Hz) must be below Nyquist ({nyquist} Hz)"
        )));
    }
    if order == 0 {
        return Err(EegError::Configuration(
            "filter order must be at least 1".to_string(),
        ));
    }

    let mut sections = highpass_sections(prewarp(low, sfreq), order);
    sections.extend(lowpass_sections(prewarp(high, sfreq), order));
    Ok(SosCascade::new(sections, 1.0))
}

/// Design a narrow band-reject (notch) filter.
///
/// `q` is the quality factor: higher values give a narrower notch.
/// Requires `0 < freq < sfreq / 2` and `q > 0`.
pub fn design_notch(freq: f64, sfreq: f64, q: f64) -> Result<SosCascade> {
    let nyquist = sfreq / 2.0;
    if freq <= 0.0 || freq >= nyquist {
        return Err(EegError::Configuration(format!(
            "notch frequency ({freq} Hz) must lie between 0 and Nyquist ({nyquist} Hz)"
        )));
    }
    if q <= 0.0 {
        return Err(EegError::Configuration(format!(
            "notch quality factor must be positive, got {q}"
        )));
    }

    let w0 = 2.0 * PI * freq / sfreq;
    let bandwidth = w0 / q;
    let cos_w0 = w0.cos();
    let alpha = w0.sin() * (bandwidth / 2.0).sinh();

    let a0 = 1.0 + alpha;
    let coeffs = BiquadCoeffs {
        b0: 1.0 / a0,
        b1: -2.0 * cos_w0 / a0,
        b2: 1.0 / a0,
        a1: -2.0 * cos_w0 / a0,
        a2: (1.0 - alpha) / a0,
    };
    Ok(SosCascade::new(vec![coeffs], 1.0))
}

/// Zero-phase filtering: run the cascade forward over the signal, then run a
/// fresh cascade over the time-reversed result and reverse again. Doubles
/// the effective attenuation and cancels the phase response.
pub fn filtfilt(template: &SosCascade, signal: &[f64]) -> Vec<f64> {
    let mut forward = template.clone();
    forward.reset();
    let mut out: Vec<f64> = signal.iter().map(|&s| forward.process(s)).collect();

    out.reverse();
    let mut backward = template.clone();
    backward.reset();
    for sample in out.iter_mut() {
        *sample = backward.process(*sample);
    }
    out.reverse();
    out
}
