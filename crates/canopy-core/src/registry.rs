//! In-memory target registry.
//!
//! Targets are loaded from a TOML file of `[[targets]]` tables. The pipeline
//! only reads from the registry.

use crate::{
    error::{CanopyError, Result},
    target::Target,
    types::TargetId,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

#[derive(Deserialize)]
struct TargetFile {
    #[serde(default)]
    targets: Vec<Target>,
}

/// In-memory cache of targets indexed by id.
#[derive(Clone, Default)]
pub struct TargetRegistry {
    targets: Arc<RwLock<HashMap<TargetId, Target>>>,
}

impl TargetRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a registry from TOML text.
    ///
    /// # Errors
    /// Returns error if the TOML is invalid or an id appears twice.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: TargetFile =
            toml::from_str(contents).map_err(|e| CanopyError::Registry(e.to_string()))?;

        let registry = Self::new();
        for target in file.targets {
            let id = target.id.clone();
            if registry.insert(target).is_some() {
                return Err(CanopyError::Registry(format!("duplicate target id '{id}'")));
            }
        }

        info!(count = registry.len(), "loaded target registry");
        Ok(registry)
    }

    /// Load a registry file from disk.
    ///
    /// # Errors
    /// Returns error if the file can't be read or parsed.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading targets from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Insert or replace a target, returning the previous entry.
    pub fn insert(&self, target: Target) -> Option<Target> {
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.id.clone(), target)
    }

    /// Get a target by id.
    ///
    /// # Errors
    /// Returns error if the target is not registered.
    pub fn get(&self, target_id: &TargetId) -> Result<Target> {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target_id)
            .cloned()
            .ok_or_else(|| CanopyError::TargetNotFound {
                target_id: target_id.to_string(),
            })
    }

    /// All targets, sorted by id.
    #[must_use]
    pub fn all(&self) -> Vec<Target> {
        let mut targets: Vec<Target> = self
            .targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        targets.sort_by(|a, b| a.id.cmp(&b.id));
        targets
    }

    /// Number of registered targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
