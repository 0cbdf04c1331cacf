//! Descriptive statistics over one channel's samples.
//!
//! Moment-based measures guard against degenerate (constant) input by
//! returning 0 instead of dividing by a vanishing variance.

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    (data.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}

/// Skewness: m3 / m2^1.5.
pub fn skewness(data: &[f64]) -> f64 {
    if data.len() < 3 {
        return 0.0;
    }
    let n = data.len() as f64;
    let m = mean(data);
    let m2 = data.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / n;
    let m3 = data.iter().map(|&x| (x - m).powi(3)).sum::<f64>() / n;
    if m2 < 1e-10 {
        return 0.0;
    }
    m3 / m2.powf(1.5)
}

/// Excess kurtosis: m4 / m2² − 3, so Gaussian input scores ≈ 0.
pub fn kurtosis(data: &[f64]) -> f64 {
    if data.len() < 4 {
        return 0.0;
    }
    let n = data.len() as f64;
    let m = mean(data);
    let m2 = data.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / n;
    let m4 = data.iter().map(|&x| (x - m).powi(4)).sum::<f64>() / n;
    if m2 < 1e-10 {
        return 0.0;
    }
    m4 / m2.powi(2) - 3.0
}

pub fn peak_to_peak(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    max - min
}

/// Linear-interpolated percentile, `q` in [0, 100].
pub fn percentile(data: &[f64], q: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let frac = pos - lower as f64;
    if lower + 1 < sorted.len() {
        sorted[lower] + frac * (sorted[lower + 1] - sorted[lower])
    } else {
        sorted[lower]
    }
}

pub fn median(data: &[f64]) -> f64 {
    percentile(data, 50.0)
}

/// Interquartile range (75th − 25th percentile).
pub fn iqr(data: &[f64]) -> f64 {
    percentile(data, 75.0) - percentile(data, 25.0)
}
