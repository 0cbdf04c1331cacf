//! FFT-based time-axis resampling.
//!
//! The signal is padded with reflect-limited samples to the next power of
//! two, transformed, its spectrum truncated (downsampling) or zero-padded
//! (upsampling), and transformed back at the new length. Output length is
//! always `round(n * target / orig)` regardless of the ratio, and the whole
//! procedure is deterministic.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::{EegError, Result};

/// Output length for a resampled signal of length `n`.
pub fn output_length(n: usize, target_rate: f64, orig_rate: f64) -> usize {
    (n as f64 * target_rate / orig_rate).round() as usize
}

/// Padding on each side: enough to reach the next power of two, with a
/// reflect-limited minimum of up to 100 samples per side.
fn pad_lengths(n: usize) -> (usize, usize) {
    let min_add = (n / 8).min(100) * 2;
    let padded = n + min_add;
    let next_pow2 = (padded as f64).log2().ceil().exp2() as usize;
    let total = next_pow2.saturating_sub(n);
    (total / 2, total - total / 2)
}

/// Resample one time lane from `orig_rate` to `target_rate`.
pub fn resample_lane(x: &[f64], target_rate: f64, orig_rate: f64) -> Result<Vec<f64>> {
    if target_rate <= 0.0 || orig_rate <= 0.0 {
        return Err(EegError::Configuration(format!(
            "resample rates must be positive, got target {target_rate} Hz / orig {orig_rate} Hz"
        )));
    }
    if x.is_empty() {
        return Err(EegError::Configuration(
            "cannot resample an empty signal".to_string(),
        ));
    }

    let ratio = target_rate / orig_rate;
    let n_in = x.len();
    let final_len = output_length(n_in, target_rate, orig_rate);
    if (ratio - 1.0).abs() < 1e-9 {
        return Ok(x.to_vec());
    }

    // Reflect-limited padding around the signal keeps the FFT from wrapping
    // edge discontinuities into the passband.
    let (npad_l, npad_r) = pad_lengths(n_in);
    let pad_l = npad_l.min(n_in - 1);
    let pad_r = npad_r.min(n_in - 1);
    let old_len = n_in + pad_l + pad_r;

    let mut padded = Vec::with_capacity(old_len);
    for i in (1..=pad_l).rev() {
        padded.push(2.0 * x[0] - x[i]);
    }
    padded.extend_from_slice(x);
    let last = x[n_in - 1];
    for i in 1..=pad_r {
        padded.push(2.0 * last - x[(n_in - 1).saturating_sub(i)]);
    }

    let new_len_padded = (ratio * old_len as f64).round() as usize;
    let shorter = new_len_padded < old_len;
    let use_len = if shorter { new_len_padded } else { old_len };

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(old_len);
    let mut buf: Vec<Complex<f64>> = padded.iter().map(|&v| Complex::new(v, 0.0)).collect();
    fft.process(&mut buf);

    let half_len = old_len / 2 + 1;
    let mut spectrum: Vec<Complex<f64>> = buf[..half_len].to_vec();

    // The Nyquist bin is shared between the positive and negative halves;
    // compensate when the effective length is even.
    if use_len % 2 == 0 {
        let nyq = use_len / 2;
        if nyq < spectrum.len() {
            spectrum[nyq] *= if shorter { 2.0 } else { 0.5 };
        }
    }

    let scale = new_len_padded as f64 / old_len as f64;
    for bin in spectrum.iter_mut() {
        *bin *= scale;
    }

    // Rebuild a full-length spectrum at the new size (truncating or
    // zero-padding the half-spectrum) and enforce Hermitian symmetry.
    let new_half_len = new_len_padded / 2 + 1;
    let mut inverse_in = vec![Complex::new(0.0, 0.0); new_len_padded];
    let n_copy = spectrum.len().min(new_half_len);
    inverse_in[..n_copy].copy_from_slice(&spectrum[..n_copy]);
    for i in 1..new_half_len {
        let mirror = new_len_padded - i;
        if mirror >= new_half_len {
            inverse_in[mirror] = inverse_in[i].conj();
        }
    }

    let ifft = planner.plan_fft_inverse(new_len_padded);
    ifft.process(&mut inverse_in);
    let inv_scale = 1.0 / new_len_padded as f64;

    // Strip the (resampled) padding back off.
    let strip_l = (ratio * pad_l as f64).round() as usize;
    let strip_r = new_len_padded.saturating_sub(final_len + strip_l);
    let end = new_len_padded.saturating_sub(strip_r);

    let mut out: Vec<f64> = inverse_in[strip_l.min(end)..end]
        .iter()
        .map(|c| c.re * inv_scale)
        .collect();
    out.resize(final_len, 0.0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn half_rate_halves_length_exactly() {
        let x = vec![0.0; 1000];
        let out = resample_lane(&x, 128.0, 256.0).unwrap();
        assert_eq!(out.len(), 500);
    }

    #[test]
    fn non_integer_ratio_rounds_length() {
        let x = vec![0.0; 1000];
        // 1000 * 100 / 256 = 390.625 -> 391
        let out = resample_lane(&x, 100.0, 256.0).unwrap();
        assert_eq!(out.len(), 391);
    }

    #[test]
    fn identical_rates_pass_through() {
        let x: Vec<f64> = (0..512).map(|i| i as f64).collect();
        let out = resample_lane(&x, 256.0, 256.0).unwrap();
        assert_eq!(out, x);
    }

    #[test]
    fn dc_level_is_preserved() {
        let x = vec![3.25; 1024];
        let out = resample_lane(&x, 256.0, 512.0).unwrap();
        assert_eq!(out.len(), 512);
        for &v in &out[10..out.len() - 10] {
            assert!((v - 3.25).abs() < 1e-2, "DC drifted to {v}");
        }
    }

    #[test]
    fn low_frequency_tone_survives_downsampling() {
        let sfreq = 512.0;
        let x: Vec<f64> = (0..2048)
            .map(|i| (2.0 * PI * 5.0 * i as f64 / sfreq).sin())
            .collect();
        let out = resample_lane(&x, 256.0, sfreq).unwrap();
        let rms_in = (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt();
        let rms_out = (out.iter().map(|v| v * v).sum::<f64>() / out.len() as f64).sqrt();
        assert!((rms_in - rms_out).abs() < 0.05);
    }

    #[test]
    fn rejects_non_positive_rates() {
        assert!(resample_lane(&[1.0, 2.0], 0.0, 256.0).is_err());
        assert!(resample_lane(&[1.0, 2.0], 128.0, -1.0).is_err());
    }

    #[test]
    fn deterministic_across_calls() {
        let x: Vec<f64> = (0..777).map(|i| ((i * 37) % 101) as f64 * 0.01).collect();
        let a = resample_lane(&x, 200.0, 256.0).unwrap();
        let b = resample_lane(&x, 200.0, 256.0).unwrap();
        assert_eq!(a, b);
    }
}
