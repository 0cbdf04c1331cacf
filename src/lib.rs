//! # eegbench — EEG analysis workbench core
//!
//! An exploratory EEG workbench: recordings are ingested into a
//! content-addressed store, run through declarative preprocessing
//! pipelines, reduced to feature matrices, and handed to pluggable
//! inference backends.
//!
//! The pieces, bottom-up:
//!
//! - [`sample::EegSample`] — the in-memory recording (channels-major f64
//!   matrix + metadata).
//! - [`preprocess`] — transform steps (filtering, resampling,
//!   normalization, re-referencing, ICA, epoching) composed into a
//!   serializable [`preprocess::Pipeline`].
//! - [`storage::EegDatabase`] — SQLite catalog + payload files; raw
//!   datasets deduplicate by content hash, derived records link to their
//!   parent, forming the lineage raw → processed → features.
//! - [`manager::DatasetManager`] — orchestrates the three above and is the
//!   only place pipeline execution and lineage meet.
//! - [`features`] — extractors producing flat instance × feature matrices,
//!   composable column-wise.
//! - [`models`] — the capability interface over inference backends with a
//!   validated type-tag registry.
//!
//! ## Example
//!
//! ```no_run
//! use eegbench::manager::{DatasetManager, PipelineOutcome};
//! use eegbench::preprocess::{Pipeline, ResampleStep};
//!
//! # fn main() -> eegbench::Result<()> {
//! let manager = DatasetManager::open("./store")?;
//! let sample = eegbench::loader::load_csv("recording.csv", 256.0, false)?;
//! let dataset_id = manager.add_sample(&sample, "recording.csv")?;
//!
//! let mut pipeline = Pipeline::default();
//! pipeline.add_step(Box::new(ResampleStep::new(128.0, 256.0)));
//! match manager.apply_pipeline(&dataset_id, &mut pipeline, true)? {
//!     PipelineOutcome::Stored(id) => println!("processed dataset {id}"),
//!     PipelineOutcome::Preview(_) => unreachable!(),
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod features;
pub mod hashing;
pub mod loader;
pub mod manager;
pub mod models;
pub mod preprocess;
pub mod sample;
pub mod storage;

pub use error::{EegError, Result};
pub use manager::{DatasetManager, FeatureOutcome, PipelineOutcome};
pub use preprocess::{Pipeline, PipelineConfig, StepConfig, Transform};
pub use sample::EegSample;
