//! Raw recording loaders.
//!
//! Binary EEG formats (EDF, BrainVision, FIFF, ...) are parsed by external
//! collaborators implementing [`RecordingLoader`]; this crate ships the
//! tabular loader, where the sampling rate is supplied by the caller since
//! CSV carries none.

use std::path::Path;

use ndarray::Array2;

use crate::error::{EegError, Result};
use crate::sample::EegSample;

/// Seam for pluggable format-specific loaders.
pub trait RecordingLoader {
    fn load(&self, path: &Path) -> Result<EegSample>;
}

/// Column headers recognized as the label column.
const LABEL_COLUMNS: &[&str] = &["label", "Label", "labels", "Labels", "target", "Target"];

/// Load a CSV recording: one column per channel, one row per time sample.
///
/// With `has_labels`, a column named like a label column (see
/// [`LABEL_COLUMNS`]) is split off as integer class labels; all remaining
/// columns become channels, transposed to channels-major.
pub fn load_csv<P: AsRef<Path>>(path: P, sfreq: f64, has_labels: bool) -> Result<EegSample> {
    let path = path.as_ref();
    if sfreq <= 0.0 {
        return Err(EegError::Configuration(format!(
            "csv loading requires a positive sampling frequency, got {sfreq}"
        )));
    }

    let mut reader = csv::Reader::from_path(path).map_err(|e| match e.kind() {
        csv::ErrorKind::Io(_) => EegError::NotFound(format!("csv file {}", path.display())),
        _ => EegError::Configuration(format!("cannot open {}: {e}", path.display())),
    })?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| EegError::Configuration(format!("bad csv header: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let label_idx = if has_labels {
        headers
            .iter()
            .position(|h| LABEL_COLUMNS.contains(&h.as_str()))
    } else {
        None
    };

    let ch_names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != label_idx)
        .map(|(_, h)| h.clone())
        .collect();
    if ch_names.is_empty() {
        return Err(EegError::Configuration(format!(
            "{} has no channel columns",
            path.display()
        )));
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); ch_names.len()];
    let mut labels: Vec<i64> = Vec::new();

    for (row_no, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| EegError::Configuration(format!("bad csv row {row_no}: {e}")))?;
        let mut channel = 0;
        for (i, field) in record.iter().enumerate() {
            if Some(i) == label_idx {
                let label: i64 = field.trim().parse().map_err(|_| {
                    EegError::Configuration(format!(
                        "row {row_no}: label '{field}' is not an integer"
                    ))
                })?;
                labels.push(label);
            } else {
                let value: f64 = field.trim().parse().map_err(|_| {
                    EegError::Configuration(format!(
                        "row {row_no}, column '{}': '{field}' is not numeric",
                        headers.get(i).map(String::as_str).unwrap_or("?")
                    ))
                })?;
                if channel < columns.len() {
                    columns[channel].push(value);
                }
                channel += 1;
            }
        }
    }

    let n_samples = columns.first().map(Vec::len).unwrap_or(0);
    if n_samples == 0 {
        return Err(EegError::Configuration(format!(
            "{} contains no data rows",
            path.display()
        )));
    }
    if columns.iter().any(|c| c.len() != n_samples) {
        return Err(EegError::ShapeMismatch(format!(
            "{} has ragged rows",
            path.display()
        )));
    }

    let data = Array2::from_shape_fn((ch_names.len(), n_samples), |(c, t)| columns[c][t]);
    let sample = EegSample::new(data.into_dyn(), sfreq, ch_names)?
        .with_labels((!labels.is_empty()).then_some(labels))
        .with_raw_path(path.to_string_lossy())
        .with_metadata(serde_json::json!({ "n_samples": n_samples }));
    Ok(sample)
}
