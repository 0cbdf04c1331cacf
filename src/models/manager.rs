//! Model lifecycle: register parameter files, deduplicate by content, load
//! backends through the registry.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{EegError, Result};
use crate::hashing::file_content_hash;
use crate::models::{Model, ModelRegistry};
use crate::storage::models_db::{ModelRecord, ModelsDatabase};

const MODELS_DB_FILE: &str = "models.db";
const MODELS_DIR: &str = "models";

pub struct ModelsManager {
    db: ModelsDatabase,
    registry: ModelRegistry,
    models_dir: PathBuf,
}

impl ModelsManager {
    /// Open the model catalog under `root` with the default registry.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::with_registry(root, ModelRegistry::default())
    }

    pub fn with_registry<P: AsRef<Path>>(root: P, registry: ModelRegistry) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let models_dir = root.join(MODELS_DIR);
        std::fs::create_dir_all(&models_dir)?;
        Ok(Self {
            db: ModelsDatabase::open(root.join(MODELS_DB_FILE))?,
            registry,
            models_dir,
        })
    }

    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        &mut self.registry
    }

    fn derive_name(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string())
    }

    /// Copy a parameter file into the managed tree, suffixing the name when
    /// a file with the same basename already exists.
    fn persist_file(&self, src: &Path, model_type: &str) -> Result<PathBuf> {
        let type_dir = self.models_dir.join(model_type);
        std::fs::create_dir_all(&type_dir)?;

        let stem = Self::derive_name(src);
        let ext = src
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut dst = type_dir.join(format!("{stem}{ext}"));
        let mut counter = 1;
        while dst.exists() {
            dst = type_dir.join(format!("{stem}_{counter}{ext}"));
            counter += 1;
        }
        std::fs::copy(src, &dst)?;
        Ok(dst)
    }

    /// Register a model parameter file. The type tag is validated against
    /// the registry before anything is hashed or copied; re-adding a file
    /// with known content returns the existing record id.
    pub fn add_model(
        &self,
        name: Option<&str>,
        model_type: &str,
        file_path: &Path,
        framework_version: &str,
        metadata: Option<&Value>,
    ) -> Result<String> {
        if !self.registry.contains(model_type) {
            return Err(EegError::UnknownModelType(model_type.to_string()));
        }
        if !file_path.exists() {
            return Err(EegError::NotFound(format!(
                "model file {}",
                file_path.display()
            )));
        }

        let file_hash = file_content_hash(file_path)?;
        if let Some(existing) = self.db.model_with_hash(&file_hash)? {
            log::info!("model content already registered as {existing}");
            return Ok(existing);
        }

        let name = match name {
            Some(n) if !n.trim().is_empty() => n.to_string(),
            _ => Self::derive_name(file_path),
        };
        let stored = self.persist_file(file_path, model_type)?;

        self.db.add_model(
            &name,
            model_type,
            &stored.to_string_lossy(),
            &file_hash,
            framework_version,
            metadata,
        )
    }

    /// Build and load the backend for a registered model.
    pub fn load_model(&self, model_id: &str) -> Result<Box<dyn Model>> {
        let record = self
            .db
            .get_model(model_id)?
            .ok_or_else(|| EegError::NotFound(format!("model {model_id}")))?;

        let mut model = self.registry.build(&record.model_type, &record.name)?;
        model.load(Path::new(&record.file_path))?;
        Ok(model)
    }

    pub fn get_model_info(&self, model_id: &str) -> Result<Option<ModelRecord>> {
        self.db.get_model(model_id)
    }

    pub fn list_models(&self) -> Result<Vec<ModelRecord>> {
        self.db.list_models()
    }

    /// Remove the catalog row and, when the parameter file lives in the
    /// managed tree, the file itself.
    pub fn delete_model(&self, model_id: &str) -> Result<bool> {
        let record = self.db.get_model(model_id)?;
        let deleted = self.db.delete_model(model_id)?;
        if deleted {
            if let Some(record) = record {
                let path = Path::new(&record.file_path);
                if path.starts_with(&self.models_dir) && path.exists() {
                    std::fs::remove_file(path)?;
                }
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_linear_params(dir: &Path, tag: u32) -> PathBuf {
        let path = dir.join(format!("weights_{tag}.json"));
        let params = json!({
            "weights": [[1.0, 0.0], [0.0, f64::from(tag)]],
            "bias": [0.0, 0.0],
        });
        std::fs::write(&path, serde_json::to_string(&params).expect("encode")).expect("write");
        path
    }

    #[test]
    fn add_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ModelsManager::open(dir.path().join("store")).unwrap();
        let params = write_linear_params(dir.path(), 1);

        let id = manager
            .add_model(Some("clf"), "linear", &params, "0.1", None)
            .unwrap();
        let model = manager.load_model(&id).unwrap();
        assert_eq!(model.name(), "clf");
        assert_eq!(model.info()["loaded"], json!(true));
    }

    #[test]
    fn same_file_content_is_deduplicated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ModelsManager::open(dir.path().join("store")).unwrap();
        let params = write_linear_params(dir.path(), 2);

        let first = manager
            .add_model(Some("a"), "linear", &params, "0.1", None)
            .unwrap();
        let second = manager
            .add_model(Some("b"), "linear", &params, "0.1", None)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.list_models().unwrap().len(), 1);
    }

    #[test]
    fn unknown_type_tag_is_rejected_before_copying() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ModelsManager::open(dir.path().join("store")).unwrap();
        let params = write_linear_params(dir.path(), 3);

        assert!(matches!(
            manager.add_model(None, "tensorflow", &params, "0.1", None),
            Err(EegError::UnknownModelType(_))
        ));
    }

    #[test]
    fn delete_removes_row_and_managed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ModelsManager::open(dir.path().join("store")).unwrap();
        let params = write_linear_params(dir.path(), 4);

        let id = manager
            .add_model(None, "linear", &params, "0.1", None)
            .unwrap();
        let stored = manager.get_model_info(&id).unwrap().expect("record").file_path;
        assert!(Path::new(&stored).exists());

        assert!(manager.delete_model(&id).unwrap());
        assert!(!Path::new(&stored).exists());
        assert!(manager.get_model_info(&id).unwrap().is_none());
        assert!(!manager.delete_model(&id).unwrap());
    }

    #[test]
    fn missing_model_id_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ModelsManager::open(dir.path().join("store")).unwrap();
        assert!(matches!(
            manager.load_model("no-such-id"),
            Err(EegError::NotFound(_))
        ));
    }
}
