//! Dataset orchestration: the one place where sample construction, pipeline
//! execution, and store persistence meet.

use std::path::Path;

use ndarray::Array2;
use serde_json::{json, Value};

use crate::error::{EegError, Result};
use crate::features::{compose_features, FeatureExtractor};
use crate::hashing::array_content_hash;
use crate::preprocess::Pipeline;
use crate::sample::EegSample;
use crate::storage::{DatasetRecord, EegDatabase, FeatureRecord, ProcessedRecord};

/// Result of a pipeline run: a persisted record id, or the in-memory sample
/// when running in preview mode.
#[derive(Debug)]
pub enum PipelineOutcome {
    Stored(String),
    Preview(EegSample),
}

/// Result of feature extraction, mirroring [`PipelineOutcome`].
#[derive(Debug)]
pub enum FeatureOutcome {
    Stored(String),
    Preview {
        features: Array2<f64>,
        labels: Option<Vec<i64>>,
    },
}

pub struct DatasetManager {
    db: EegDatabase,
}

impl DatasetManager {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Ok(Self {
            db: EegDatabase::open(root)?,
        })
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &EegDatabase {
        &self.db
    }

    // -- raw samples --------------------------------------------------------

    /// Ingest a sample; re-ingesting identical content returns the existing
    /// record id without writing anything.
    pub fn add_sample(&self, sample: &EegSample, filename: &str) -> Result<String> {
        let content_hash = array_content_hash(&sample.data);
        if let Some(existing) = self.db.dataset_with_hash(&content_hash)? {
            log::info!("content of '{filename}' already stored as {existing}");
            return Ok(existing);
        }
        self.db.add_dataset(
            filename,
            &content_hash,
            sample.sfreq,
            &sample.ch_names,
            sample.metadata.as_ref(),
            &sample.data,
        )
    }

    pub fn get_sample(&self, dataset_id: &str) -> Result<Option<EegSample>> {
        let record = match self.db.get_dataset(dataset_id)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let data = match self.db.get_dataset_data(dataset_id)? {
            Some(data) => data,
            None => return Ok(None),
        };
        let mut sample = EegSample::new(data, record.sfreq, record.ch_names)?;
        sample.raw_path = Some(record.filename);
        sample.metadata = record.metadata;
        Ok(Some(sample))
    }

    pub fn list_samples(&self) -> Result<Vec<DatasetRecord>> {
        self.db.list_datasets()
    }

    pub fn delete_sample(&self, dataset_id: &str) -> Result<bool> {
        self.db.delete_dataset(dataset_id)
    }

    // -- pipeline runs ------------------------------------------------------

    /// Run a pipeline over a stored raw dataset.
    ///
    /// The output sample keeps the parent's channel names, identifiers, and
    /// labels (steps never touch either), and adopts the target rate of the
    /// last `resample` step as its sampling frequency. With `save` the
    /// result is persisted as a processed record carrying the pipeline's
    /// full configuration; without it the sample is returned for preview.
    pub fn apply_pipeline(
        &self,
        dataset_id: &str,
        pipeline: &mut Pipeline,
        save: bool,
    ) -> Result<PipelineOutcome> {
        let sample = self
            .get_sample(dataset_id)?
            .ok_or_else(|| EegError::NotFound(format!("dataset {dataset_id}")))?;

        let transformed = pipeline.fit_transform(&sample.data, sample.labels.as_deref())?;

        let sfreq = effective_sfreq(pipeline, sample.sfreq);
        let metadata = json!({
            "input_shape": sample.data.shape(),
            "output_shape": transformed.shape(),
        });

        let mut processed = EegSample::new(transformed, sfreq, sample.ch_names.clone())?;
        processed.subject_id = sample.subject_id.clone();
        processed.session_id = sample.session_id.clone();
        processed.task = sample.task.clone();
        processed.labels = sample.labels.clone();
        processed.metadata = Some(metadata.clone());

        if !save {
            return Ok(PipelineOutcome::Preview(processed));
        }

        let id = self.db.add_processed(
            dataset_id,
            &pipeline.to_config(),
            processed.sfreq,
            &processed.ch_names,
            Some(&metadata),
            &processed.data,
        )?;
        log::info!("pipeline output stored as processed dataset {id}");
        Ok(PipelineOutcome::Stored(id))
    }

    pub fn get_processed_sample(&self, proc_id: &str) -> Result<Option<EegSample>> {
        let record = match self.db.get_processed(proc_id)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let data = match self.db.get_processed_data(proc_id)? {
            Some(data) => data,
            None => return Ok(None),
        };
        let mut sample = EegSample::new(data, record.sfreq, record.ch_names)?;
        sample.metadata = record.metadata;
        Ok(Some(sample))
    }

    pub fn get_processed_info(&self, proc_id: &str) -> Result<Option<ProcessedRecord>> {
        self.db.get_processed(proc_id)
    }

    pub fn list_processed(&self, parent_id: Option<&str>) -> Result<Vec<ProcessedRecord>> {
        self.db.list_processed(parent_id)
    }

    pub fn delete_processed(&self, proc_id: &str) -> Result<bool> {
        self.db.delete_processed(proc_id)
    }

    /// The raw parent of a processed record. A dangling `parent_id` (parent
    /// deleted after the child was created) resolves to `None`, not an
    /// error.
    pub fn get_processed_parent(&self, proc_id: &str) -> Result<Option<DatasetRecord>> {
        match self.db.get_processed(proc_id)? {
            Some(record) => self.db.get_dataset(&record.parent_id),
            None => Ok(None),
        }
    }

    // -- feature extraction -------------------------------------------------

    /// Run one or more extractors over a processed dataset and compose their
    /// outputs column-wise. Every extractor must agree on the instance
    /// count; `labels`, when given, must match it too.
    pub fn extract_features(
        &self,
        proc_id: &str,
        extractors: &mut [Box<dyn FeatureExtractor>],
        labels: Option<&[i64]>,
        save: bool,
    ) -> Result<FeatureOutcome> {
        if extractors.is_empty() {
            return Err(EegError::Configuration(
                "feature extraction needs at least one extractor".to_string(),
            ));
        }
        self.db
            .get_processed(proc_id)?
            .ok_or_else(|| EegError::NotFound(format!("processed dataset {proc_id}")))?;
        let data = self
            .db
            .get_processed_data(proc_id)?
            .ok_or_else(|| EegError::NotFound(format!("processed dataset {proc_id}")))?;

        let mut outputs = Vec::with_capacity(extractors.len());
        for extractor in extractors.iter_mut() {
            outputs.push(extractor.fit_transform(&data, labels)?);
        }
        let composed = compose_features(&outputs)?;

        if let Some(labels) = labels {
            if labels.len() != composed.nrows() {
                return Err(EegError::ShapeMismatch(format!(
                    "{} labels for {} feature instances",
                    labels.len(),
                    composed.nrows()
                )));
            }
        }

        if !save {
            return Ok(FeatureOutcome::Preview {
                features: composed,
                labels: labels.map(|l| l.to_vec()),
            });
        }

        let config = Value::Array(
            extractors
                .iter()
                .map(|e| serde_json::to_value(e.to_config()))
                .collect::<std::result::Result<_, _>>()?,
        );
        let metadata = json!({ "input_shape": data.shape() });
        let id = self
            .db
            .add_features(proc_id, &config, &composed, labels, Some(&metadata))?;
        log::info!("features stored as feature set {id}");
        Ok(FeatureOutcome::Stored(id))
    }

    pub fn get_features_info(&self, feat_id: &str) -> Result<Option<FeatureRecord>> {
        self.db.get_features(feat_id)
    }

    pub fn get_features_data(&self, feat_id: &str) -> Result<Option<(Array2<f64>, Option<Vec<i64>>)>> {
        self.db.get_features_data(feat_id)
    }

    pub fn list_features(&self, parent_id: Option<&str>) -> Result<Vec<FeatureRecord>> {
        self.db.list_features(parent_id)
    }

    pub fn delete_features(&self, feat_id: &str) -> Result<bool> {
        self.db.delete_features(feat_id)
    }
}

/// Output sampling rate of a pipeline applied to data at `parent_sfreq`:
/// the target rate of the last `resample` step wins, matching execution
/// order; without one the parent's rate carries over.
fn effective_sfreq(pipeline: &Pipeline, parent_sfreq: f64) -> f64 {
    let mut sfreq = parent_sfreq;
    for step in pipeline.steps() {
        if step.name() == "resample" {
            if let Some(rate) = step.params().get("target_rate").and_then(Value::as_f64) {
                sfreq = rate;
            }
        }
    }
    sfreq
}
