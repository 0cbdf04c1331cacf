//! Independent-component cleanup.
//!
//! FastICA decomposes the recording into statistically independent sources;
//! reconstructing from the leading `n_components` sources yields a cleaned
//! signal of the original shape. The decomposition (sources, mixing matrix)
//! is scoped to a single run and intentionally never leaves this module.

use linfa::prelude::*;
use linfa_ica::fast_ica::FastIca;
use ndarray::{Array1, Array2, Axis};

use crate::error::{EegError, Result};

const MAX_ITERATIONS: usize = 200;
const TOLERANCE: f64 = 1e-4;

/// Decompose `x` (channels × time) into `n_components` independent sources
/// and reconstruct a same-shape signal from them.
///
/// Deterministic for a fixed `random_state`.
pub fn reconstruct(x: &Array2<f64>, n_components: usize, random_state: u64) -> Result<Array2<f64>> {
    let n_channels = x.nrows();
    let n_samples = x.ncols();

    if n_components == 0 {
        return Err(EegError::Configuration(
            "ica requires at least one component".to_string(),
        ));
    }
    if n_components > n_channels {
        return Err(EegError::Configuration(format!(
            "ica component count ({n_components}) cannot exceed channel count ({n_channels})"
        )));
    }
    if n_samples < n_channels {
        return Err(EegError::Configuration(format!(
            "ica needs at least as many time samples ({n_samples}) as channels ({n_channels})"
        )));
    }

    // linfa expects observations in rows: (n_samples, n_channels).
    let observations = Array2::from_shape_fn((n_samples, n_channels), |(i, j)| x[[j, i]]);
    let means: Array1<f64> = observations
        .mean_axis(Axis(0))
        .ok_or_else(|| EegError::Computation("mean of empty observation matrix".to_string()))?;
    let centered = &observations - &means;

    let dataset = DatasetBase::from(centered.clone());
    let ica = FastIca::params()
        .ncomponents(n_components)
        .max_iter(MAX_ITERATIONS)
        .tol(TOLERANCE)
        .random_state(random_state as usize);
    let fitted = ica
        .fit(&dataset)
        .map_err(|e| EegError::Computation(format!("FastICA fit failed: {e:?}")))?;

    // Sources: (n_samples, n_components).
    let sources = fitted.predict(&centered);

    // Recover the mixing matrix by least squares, A = Xᵀ S (SᵀS)⁻¹,
    // then reconstruct X̂ = S Aᵀ and restore the channel means.
    let sts = sources.t().dot(&sources);
    let sts_inv = invert(&sts)?;
    let mixing = centered.t().dot(&sources).dot(&sts_inv);
    let reconstructed = sources.dot(&mixing.t()) + &means;

    Ok(Array2::from_shape_fn((n_channels, n_samples), |(c, t)| {
        reconstructed[[t, c]]
    }))
}

/// Gauss-Jordan inversion with partial pivoting.
fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(EegError::Computation(
            "cannot invert a non-square matrix".to_string(),
        ));
    }

    let mut aug = Array2::<f64>::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = matrix[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for i in 0..n {
        let mut pivot_row = i;
        for k in (i + 1)..n {
            if aug[[k, i]].abs() > aug[[pivot_row, i]].abs() {
                pivot_row = k;
            }
        }
        if pivot_row != i {
            for j in 0..(2 * n) {
                aug.swap([i, j], [pivot_row, j]);
            }
        }

        let pivot = aug[[i, i]];
        if pivot.abs() < 1e-12 {
            return Err(EegError::Computation(
                "singular source covariance during ica reconstruction".to_string(),
            ));
        }
        for j in 0..(2 * n) {
            aug[[i, j]] /= pivot;
        }
        for k in 0..n {
            if k == i {
                continue;
            }
            let factor = aug[[k, i]];
            if factor != 0.0 {
                for j in 0..(2 * n) {
                    aug[[k, j]] -= factor * aug[[i, j]];
                }
            }
        }
    }

    Ok(Array2::from_shape_fn((n, n), |(i, j)| aug[[i, n + j]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn mixed_signals(n_channels: usize, n_samples: usize) -> Array2<f64> {
        Array2::from_shape_fn((n_channels, n_samples), |(c, t)| {
            let t = t as f64 / 256.0;
            let f1 = 5.0 + c as f64;
            let f2 = 11.0 + 0.5 * c as f64;
            (2.0 * PI * f1 * t).sin() + 0.5 * (2.0 * PI * f2 * t).cos()
        })
    }

    #[test]
    fn invert_recovers_identity() {
        let m = ndarray::arr2(&[[4.0, 7.0], [2.0, 6.0]]);
        let inv = invert(&m).unwrap();
        let product = m.dot(&inv);
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product[[i, j]] - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn invert_rejects_singular() {
        let m = ndarray::arr2(&[[1.0, 2.0], [2.0, 4.0]]);
        assert!(invert(&m).is_err());
    }

    #[test]
    fn reconstruct_preserves_shape() {
        let x = mixed_signals(4, 512);
        let cleaned = reconstruct(&x, 4, 42).unwrap();
        assert_eq!(cleaned.dim(), (4, 512));
    }

    #[test]
    fn full_rank_reconstruction_is_close_to_input() {
        let x = mixed_signals(3, 768);
        let cleaned = reconstruct(&x, 3, 42).unwrap();
        let err: f64 = (&cleaned - &x).iter().map(|v| v * v).sum::<f64>()
            / x.iter().map(|v| v * v).sum::<f64>();
        assert!(err < 0.05, "relative reconstruction error {err}");
    }

    #[test]
    fn component_count_cannot_exceed_channels() {
        let x = mixed_signals(3, 256);
        assert!(matches!(
            reconstruct(&x, 5, 42),
            Err(EegError::Configuration(_))
        ));
    }
}
