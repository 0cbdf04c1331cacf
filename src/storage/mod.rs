//! Durable storage: content-addressed dataset store and model catalog.

pub mod eeg_db;
pub mod models_db;
pub mod payload;

pub use eeg_db::{DatasetRecord, EegDatabase, FeatureRecord, ProcessedRecord};
pub use models_db::{ModelRecord, ModelsDatabase};
pub use payload::PayloadStore;
