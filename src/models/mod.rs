//! Pluggable inference backends behind one capability interface.
//!
//! Backends are selected by a string type tag resolved through a validated
//! registry; an unknown tag fails fast instead of being resolved
//! reflectively. Heavyweight framework backends live outside this crate and
//! plug in through [`ModelRegistry::register`]; the built-in `linear`
//! backend covers plain weight-matrix models.

pub mod linear;
pub mod manager;

use std::collections::HashMap;
use std::path::Path;

use ndarray::Array2;
use serde_json::Value;

use crate::error::{EegError, Result};

pub use linear::LinearModel;
pub use manager::ModelsManager;

/// Capability set every inference backend exposes.
pub trait Model {
    fn name(&self) -> &str;

    /// Load parameters from a persisted file.
    fn load(&mut self, path: &Path) -> Result<()>;

    /// Predict one output per instance row.
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>>;

    /// Descriptive mapping (type, dimensions, load state, ...).
    fn info(&self) -> Value;
}

type ModelConstructor = fn(name: &str) -> Box<dyn Model>;

/// Name → constructor table for model backends.
pub struct ModelRegistry {
    constructors: HashMap<String, ModelConstructor>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        // Registration of the built-ins cannot collide on a fresh table.
        let _ = registry.register("linear", |name| Box::new(LinearModel::new(name)));
        registry
    }
}

impl ModelRegistry {
    /// Register a backend constructor under a type tag. The tag is validated
    /// here, at registration time: empty or duplicate tags are rejected.
    pub fn register(&mut self, type_tag: &str, constructor: ModelConstructor) -> Result<()> {
        if type_tag.trim().is_empty() {
            return Err(EegError::Configuration(
                "model type tag must not be empty".to_string(),
            ));
        }
        if self.constructors.contains_key(type_tag) {
            return Err(EegError::Configuration(format!(
                "model type '{type_tag}' is already registered"
            )));
        }
        self.constructors.insert(type_tag.to_string(), constructor);
        Ok(())
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.constructors.contains_key(type_tag)
    }

    /// Construct an unloaded backend for the tag.
    pub fn build(&self, type_tag: &str, name: &str) -> Result<Box<dyn Model>> {
        let constructor = self
            .constructors
            .get(type_tag)
            .ok_or_else(|| EegError::UnknownModelType(type_tag.to_string()))?;
        Ok(constructor(name))
    }

    pub fn type_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.constructors.keys().cloned().collect();
        tags.sort();
        tags
    }
}
