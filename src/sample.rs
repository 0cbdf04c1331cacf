use ndarray::ArrayD;
use serde_json::Value;

use crate::error::{EegError, Result};

/// In-memory EEG recording.
///
/// `data` is channels-major: 2-D `(channels, time)` for continuous signals or
/// 3-D `(channels, epochs, window)` after epoching. The time axis is always
/// the last axis. Two invariants hold for every constructed sample:
/// `ch_names.len() == data.shape()[0]` and `sfreq > 0`.
///
/// Samples are not mutated after construction; pipeline runs build new
/// samples from transformed data.
#[derive(Debug, Clone)]
pub struct EegSample {
    pub data: ArrayD<f64>,
    /// Sampling frequency in Hz.
    pub sfreq: f64,
    pub ch_names: Vec<String>,
    pub subject_id: Option<String>,
    pub session_id: Option<String>,
    pub task: Option<String>,
    /// Class labels, one per time-sample or per epoch.
    pub labels: Option<Vec<i64>>,
    /// Path of the source file, when the sample came from a loader.
    pub raw_path: Option<String>,
    /// Open provenance mapping (shape history, loader details, ...).
    pub metadata: Option<Value>,
}

impl EegSample {
    pub fn new(data: ArrayD<f64>, sfreq: f64, ch_names: Vec<String>) -> Result<Self> {
        if sfreq <= 0.0 {
            return Err(EegError::Configuration(format!(
                "sampling frequency must be positive, got {sfreq}"
            )));
        }
        if data.ndim() != 2 && data.ndim() != 3 {
            return Err(EegError::ShapeMismatch(format!(
                "sample data must be 2-D (channels, time) or 3-D (channels, epochs, window), got {} dimensions",
                data.ndim()
            )));
        }
        if ch_names.len() != data.shape()[0] {
            return Err(EegError::ShapeMismatch(format!(
                "{} channel names for {} data channels",
                ch_names.len(),
                data.shape()[0]
            )));
        }
        Ok(Self {
            data,
            sfreq,
            ch_names,
            subject_id: None,
            session_id: None,
            task: None,
            labels: None,
            raw_path: None,
            metadata: None,
        })
    }

    pub fn with_labels(mut self, labels: Option<Vec<i64>>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_raw_path(mut self, path: impl Into<String>) -> Self {
        self.raw_path = Some(path.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn n_channels(&self) -> usize {
        self.data.shape()[0]
    }

    /// Length of the time axis (the last axis).
    pub fn n_samples(&self) -> usize {
        *self.data.shape().last().unwrap_or(&0)
    }
}
