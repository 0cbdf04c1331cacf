//! Catalog of registered inference models.
//!
//! Rows reference parameter files kept under the store's `models/` tree;
//! dedup works the same way as for raw datasets, through a UNIQUE index on
//! the file hash.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    pub model_type: String,
    pub file_path: String,
    pub file_hash: String,
    pub framework_version: String,
    pub metadata: Option<Value>,
    pub created_at: String,
}

#[derive(Debug)]
pub struct ModelsDatabase {
    conn: Mutex<Connection>,
}

impl ModelsDatabase {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS models (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                model_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_hash TEXT NOT NULL UNIQUE,
                framework_version TEXT NOT NULL,
                metadata TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_models_hash ON models(file_hash);
            CREATE INDEX IF NOT EXISTS idx_models_created ON models(created_at DESC);",
        )?;
        Ok(())
    }

    pub fn model_with_hash(&self, file_hash: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let id = conn
            .query_row(
                "SELECT id FROM models WHERE file_hash = ?1",
                params![file_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn add_model(
        &self,
        name: &str,
        model_type: &str,
        file_path: &str,
        file_hash: &str,
        framework_version: &str,
        metadata: Option<&Value>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.conn.lock().execute(
            "INSERT INTO models
             (id, name, model_type, file_path, file_hash, framework_version, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                name,
                model_type,
                file_path,
                file_hash,
                framework_version,
                metadata.map(serde_json::to_string).transpose()?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    pub fn get_model(&self, id: &str) -> Result<Option<ModelRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, name, model_type, file_path, file_hash, framework_version,
                        metadata, created_at
                 FROM models WHERE id = ?1",
                params![id],
                |row| {
                    let metadata: Option<String> = row.get(6)?;
                    Ok(ModelRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        model_type: row.get(2)?,
                        file_path: row.get(3)?,
                        file_hash: row.get(4)?,
                        framework_version: row.get(5)?,
                        metadata: metadata
                            .map(|t| serde_json::from_str(&t))
                            .transpose()
                            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
                        created_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_models(&self) -> Result<Vec<ModelRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, model_type, file_path, file_hash, framework_version,
                    metadata, created_at
             FROM models
             ORDER BY created_at DESC",
        )?;
        let records = stmt
            .query_map([], |row| {
                let metadata: Option<String> = row.get(6)?;
                Ok(ModelRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    model_type: row.get(2)?,
                    file_path: row.get(3)?,
                    file_hash: row.get(4)?,
                    framework_version: row.get(5)?,
                    metadata: metadata
                        .map(|t| serde_json::from_str(&t))
                        .transpose()
                        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn delete_model(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM models WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
