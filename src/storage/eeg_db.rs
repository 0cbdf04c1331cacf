//! Content-addressed dataset store.
//!
//! One SQLite catalog plus a payload directory. Raw datasets are
//! deduplicated by content hash through a UNIQUE index; processed datasets
//! and feature sets always create new records and point at their parent
//! through an indexed `parent_id`, forming the lineage forest
//! raw → processed → features. Deletes never cascade: readers resolve a
//! dangling parent to "unavailable" rather than failing.

use std::path::Path;

use ndarray::{Array2, ArrayD};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{EegError, Result};
use crate::preprocess::PipelineConfig;
use crate::storage::payload::PayloadStore;

const CATALOG_FILE: &str = "catalog.db";
const ARRAY_DIR: &str = "arrays";

/// Raw dataset row; shape fields are denormalized so listings never touch
/// the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub filename: String,
    pub content_hash: String,
    pub sfreq: f64,
    pub n_channels: usize,
    pub n_samples: usize,
    pub ch_names: Vec<String>,
    pub metadata: Option<Value>,
    pub created_at: String,
}

/// Processed dataset row; carries the full pipeline configuration that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub id: String,
    pub parent_id: String,
    pub pipeline_config: PipelineConfig,
    pub sfreq: f64,
    pub n_channels: usize,
    pub n_samples: usize,
    pub ch_names: Vec<String>,
    pub metadata: Option<Value>,
    pub created_at: String,
}

/// Feature set row: a flat instances × features matrix with optional labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: String,
    pub parent_id: String,
    pub extractor_config: Value,
    pub n_instances: usize,
    pub n_features: usize,
    pub labels: Option<Vec<i64>>,
    pub metadata: Option<Value>,
    pub created_at: String,
}

#[derive(Debug)]
pub struct EegDatabase {
    conn: Mutex<Connection>,
    payloads: PayloadStore,
}

fn json_column<T: serde::de::DeserializeOwned>(
    text: String,
) -> std::result::Result<T, rusqlite::Error> {
    serde_json::from_str(&text).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn optional_json_column(text: Option<String>) -> std::result::Result<Option<Value>, rusqlite::Error> {
    text.map(|t| json_column(t)).transpose()
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl EegDatabase {
    /// Open (or create) a store rooted at `root`: `root/catalog.db` plus
    /// `root/arrays/` for payloads.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let payloads = PayloadStore::new(root.join(ARRAY_DIR))?;

        let conn = Connection::open(root.join(CATALOG_FILE))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        let db = Self {
            conn: Mutex::new(conn),
            payloads,
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS datasets (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                sfreq REAL NOT NULL,
                n_channels INTEGER NOT NULL,
                n_samples INTEGER NOT NULL,
                ch_names TEXT NOT NULL,
                metadata TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS processed_datasets (
                id TEXT PRIMARY KEY,
                parent_id TEXT NOT NULL,
                pipeline_config TEXT NOT NULL,
                sfreq REAL NOT NULL,
                n_channels INTEGER NOT NULL,
                n_samples INTEGER NOT NULL,
                ch_names TEXT NOT NULL,
                metadata TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS feature_sets (
                id TEXT PRIMARY KEY,
                parent_id TEXT NOT NULL,
                extractor_config TEXT NOT NULL,
                n_instances INTEGER NOT NULL,
                n_features INTEGER NOT NULL,
                labels TEXT,
                metadata TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_datasets_hash ON datasets(content_hash);
            CREATE INDEX IF NOT EXISTS idx_datasets_created ON datasets(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_processed_parent ON processed_datasets(parent_id);
            CREATE INDEX IF NOT EXISTS idx_processed_created ON processed_datasets(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_features_parent ON feature_sets(parent_id);
            CREATE INDEX IF NOT EXISTS idx_features_created ON feature_sets(created_at DESC);",
        )?;
        Ok(())
    }

    // -- raw datasets -------------------------------------------------------

    /// Id of the dataset holding content with this hash, if any.
    pub fn dataset_with_hash(&self, content_hash: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let id = conn
            .query_row(
                "SELECT id FROM datasets WHERE content_hash = ?1",
                params![content_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Ingest a raw dataset. Idempotent on content: the payload is written
    /// first and the row inserted optimistically; a UNIQUE-constraint
    /// conflict on the hash discards the fresh payload and returns the
    /// existing record id.
    #[allow(clippy::too_many_arguments)]
    pub fn add_dataset(
        &self,
        filename: &str,
        content_hash: &str,
        sfreq: f64,
        ch_names: &[String],
        metadata: Option<&Value>,
        data: &ArrayD<f64>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let ch_names_json = serde_json::to_string(ch_names)?;
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        self.payloads.write(&id, data)?;

        let insert = self.conn.lock().execute(
            "INSERT INTO datasets
             (id, filename, content_hash, sfreq, n_channels, n_samples, ch_names, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                filename,
                content_hash,
                sfreq,
                data.shape()[0] as i64,
                *data.shape().last().unwrap_or(&0) as i64,
                ch_names_json,
                metadata_json,
                now_rfc3339(),
            ],
        );

        match insert {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => {
                // Lost the dedup race (or the content was already known):
                // drop the fresh payload and hand back the existing record.
                self.payloads.remove(&id)?;
                self.dataset_with_hash(content_hash)?.ok_or_else(|| {
                    EegError::StorageIntegrity(format!(
                        "hash conflict for {content_hash} but no owning row found"
                    ))
                })
            }
            Err(e) => {
                // Roll the payload back so a failed insert leaves nothing
                // behind.
                let _ = self.payloads.remove(&id);
                Err(e.into())
            }
        }
    }

    pub fn get_dataset(&self, id: &str) -> Result<Option<DatasetRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, filename, content_hash, sfreq, n_channels, n_samples,
                        ch_names, metadata, created_at
                 FROM datasets WHERE id = ?1",
                params![id],
                |row| {
                    Ok(DatasetRecord {
                        id: row.get(0)?,
                        filename: row.get(1)?,
                        content_hash: row.get(2)?,
                        sfreq: row.get(3)?,
                        n_channels: row.get::<_, i64>(4)? as usize,
                        n_samples: row.get::<_, i64>(5)? as usize,
                        ch_names: json_column(row.get::<_, String>(6)?)?,
                        metadata: optional_json_column(row.get(7)?)?,
                        created_at: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Load a raw payload. `Ok(None)` for an unknown id; a catalog row whose
    /// payload file has gone missing is corruption and is reported as such.
    pub fn get_dataset_data(&self, id: &str) -> Result<Option<ArrayD<f64>>> {
        if self.get_dataset(id)?.is_none() {
            return Ok(None);
        }
        match self.payloads.read(id)? {
            Some(data) => Ok(Some(data)),
            None => Err(EegError::StorageIntegrity(format!(
                "dataset {id} has a catalog row but no payload file"
            ))),
        }
    }

    pub fn list_datasets(&self) -> Result<Vec<DatasetRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, filename, content_hash, sfreq, n_channels, n_samples,
                    ch_names, metadata, created_at
             FROM datasets
             ORDER BY created_at DESC",
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(DatasetRecord {
                    id: row.get(0)?,
                    filename: row.get(1)?,
                    content_hash: row.get(2)?,
                    sfreq: row.get(3)?,
                    n_channels: row.get::<_, i64>(4)? as usize,
                    n_samples: row.get::<_, i64>(5)? as usize,
                    ch_names: json_column(row.get::<_, String>(6)?)?,
                    metadata: optional_json_column(row.get(7)?)?,
                    created_at: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Delete a raw dataset: payload first, then the row. Children are not
    /// cascaded; their `parent_id` is left dangling by design.
    pub fn delete_dataset(&self, id: &str) -> Result<bool> {
        self.payloads.remove(id)?;
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM datasets WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // -- processed datasets -------------------------------------------------

    /// Persist a pipeline output. Unlike raw ingestion this is never
    /// deduplicated: each run is its own record.
    #[allow(clippy::too_many_arguments)]
    pub fn add_processed(
        &self,
        parent_id: &str,
        pipeline_config: &PipelineConfig,
        sfreq: f64,
        ch_names: &[String],
        metadata: Option<&Value>,
        data: &ArrayD<f64>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let config_json = serde_json::to_string(pipeline_config)?;
        let ch_names_json = serde_json::to_string(ch_names)?;
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        self.payloads.write(&id, data)?;

        let insert = self.conn.lock().execute(
            "INSERT INTO processed_datasets
             (id, parent_id, pipeline_config, sfreq, n_channels, n_samples, ch_names, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                parent_id,
                config_json,
                sfreq,
                data.shape()[0] as i64,
                *data.shape().last().unwrap_or(&0) as i64,
                ch_names_json,
                metadata_json,
                now_rfc3339(),
            ],
        );

        match insert {
            Ok(_) => Ok(id),
            Err(e) => {
                let _ = self.payloads.remove(&id);
                Err(e.into())
            }
        }
    }

    pub fn get_processed(&self, id: &str) -> Result<Option<ProcessedRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, parent_id, pipeline_config, sfreq, n_channels, n_samples,
                        ch_names, metadata, created_at
                 FROM processed_datasets WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ProcessedRecord {
                        id: row.get(0)?,
                        parent_id: row.get(1)?,
                        pipeline_config: json_column(row.get::<_, String>(2)?)?,
                        sfreq: row.get(3)?,
                        n_channels: row.get::<_, i64>(4)? as usize,
                        n_samples: row.get::<_, i64>(5)? as usize,
                        ch_names: json_column(row.get::<_, String>(6)?)?,
                        metadata: optional_json_column(row.get(7)?)?,
                        created_at: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_processed_data(&self, id: &str) -> Result<Option<ArrayD<f64>>> {
        if self.get_processed(id)?.is_none() {
            return Ok(None);
        }
        match self.payloads.read(id)? {
            Some(data) => Ok(Some(data)),
            None => Err(EegError::StorageIntegrity(format!(
                "processed dataset {id} has a catalog row but no payload file"
            ))),
        }
    }

    /// List processed datasets, newest first, optionally restricted to one
    /// raw parent.
    pub fn list_processed(&self, parent_id: Option<&str>) -> Result<Vec<ProcessedRecord>> {
        let conn = self.conn.lock();
        let base = "SELECT id, parent_id, pipeline_config, sfreq, n_channels, n_samples,
                           ch_names, metadata, created_at
                    FROM processed_datasets";
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(ProcessedRecord {
                id: row.get(0)?,
                parent_id: row.get(1)?,
                pipeline_config: json_column(row.get::<_, String>(2)?)?,
                sfreq: row.get(3)?,
                n_channels: row.get::<_, i64>(4)? as usize,
                n_samples: row.get::<_, i64>(5)? as usize,
                ch_names: json_column(row.get::<_, String>(6)?)?,
                metadata: optional_json_column(row.get(7)?)?,
                created_at: row.get(8)?,
            })
        };

        let records = match parent_id {
            Some(parent) => {
                let mut stmt = conn.prepare(&format!(
                    "{base} WHERE parent_id = ?1 ORDER BY created_at DESC"
                ))?;
                let rows = stmt.query_map(params![parent], map_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!("{base} ORDER BY created_at DESC"))?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    pub fn delete_processed(&self, id: &str) -> Result<bool> {
        self.payloads.remove(id)?;
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM processed_datasets WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // -- feature sets -------------------------------------------------------

    pub fn add_features(
        &self,
        parent_id: &str,
        extractor_config: &Value,
        features: &Array2<f64>,
        labels: Option<&[i64]>,
        metadata: Option<&Value>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let config_json = serde_json::to_string(extractor_config)?;
        let labels_json = labels.map(serde_json::to_string).transpose()?;
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        self.payloads.write(&id, &features.clone().into_dyn())?;

        let insert = self.conn.lock().execute(
            "INSERT INTO feature_sets
             (id, parent_id, extractor_config, n_instances, n_features, labels, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                parent_id,
                config_json,
                features.nrows() as i64,
                features.ncols() as i64,
                labels_json,
                metadata_json,
                now_rfc3339(),
            ],
        );

        match insert {
            Ok(_) => Ok(id),
            Err(e) => {
                let _ = self.payloads.remove(&id);
                Err(e.into())
            }
        }
    }

    pub fn get_features(&self, id: &str) -> Result<Option<FeatureRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, parent_id, extractor_config, n_instances, n_features,
                        labels, metadata, created_at
                 FROM feature_sets WHERE id = ?1",
                params![id],
                |row| {
                    let labels: Option<String> = row.get(5)?;
                    Ok(FeatureRecord {
                        id: row.get(0)?,
                        parent_id: row.get(1)?,
                        extractor_config: json_column(row.get::<_, String>(2)?)?,
                        n_instances: row.get::<_, i64>(3)? as usize,
                        n_features: row.get::<_, i64>(4)? as usize,
                        labels: labels.map(json_column).transpose()?,
                        metadata: optional_json_column(row.get(6)?)?,
                        created_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Load a feature matrix together with its labels.
    pub fn get_features_data(&self, id: &str) -> Result<Option<(Array2<f64>, Option<Vec<i64>>)>> {
        let record = match self.get_features(id)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let data = match self.payloads.read(id)? {
            Some(data) => data,
            None => {
                return Err(EegError::StorageIntegrity(format!(
                    "feature set {id} has a catalog row but no payload file"
                )))
            }
        };
        let matrix = data.into_dimensionality::<ndarray::Ix2>().map_err(|_| {
            EegError::StorageIntegrity(format!("feature set {id} payload is not a 2-D matrix"))
        })?;
        Ok(Some((matrix, record.labels)))
    }

    pub fn list_features(&self, parent_id: Option<&str>) -> Result<Vec<FeatureRecord>> {
        let conn = self.conn.lock();
        let base = "SELECT id, parent_id, extractor_config, n_instances, n_features,
                           labels, metadata, created_at
                    FROM feature_sets";
        let map_row = |row: &rusqlite::Row<'_>| {
            let labels: Option<String> = row.get(5)?;
            Ok(FeatureRecord {
                id: row.get(0)?,
                parent_id: row.get(1)?,
                extractor_config: json_column(row.get::<_, String>(2)?)?,
                n_instances: row.get::<_, i64>(3)? as usize,
                n_features: row.get::<_, i64>(4)? as usize,
                labels: labels.map(json_column).transpose()?,
                metadata: optional_json_column(row.get(6)?)?,
                created_at: row.get(7)?,
            })
        };

        let records = match parent_id {
            Some(parent) => {
                let mut stmt = conn.prepare(&format!(
                    "{base} WHERE parent_id = ?1 ORDER BY created_at DESC"
                ))?;
                let rows = stmt.query_map(params![parent], map_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!("{base} ORDER BY created_at DESC"))?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    pub fn delete_features(&self, id: &str) -> Result<bool> {
        self.payloads.remove(id)?;
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM feature_sets WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Payload path for a record id (diagnostics and tests).
    pub fn payload_path(&self, id: &str) -> std::path::PathBuf {
        self.payloads.path_for(id)
    }
}
