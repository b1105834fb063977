//! Engine manifest loader.
//!
//! Reads the manifest JSON file and validates it before the engine starts.

use super::schema::EngineManifest;
use crate::config::expand_home_path;
use crate::error::{EngineError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads and validates engine manifests.
pub struct ManifestLoader {
    path: PathBuf,
}

impl ManifestLoader {
    /// Create a loader for the given manifest path.
    ///
    /// `~` and `$HOME` in the path are expanded.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: expand_home_path(path.as_ref()),
        }
    }

    /// Get the manifest path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest, falling back to the built-in default when the file
    /// does not exist.
    pub fn load_or_default(&self) -> Result<EngineManifest> {
        if !self.path.exists() {
            info!(
                "No manifest at {}, using built-in defaults",
                self.path.display()
            );
            return Ok(EngineManifest::default());
        }
        self.load()
    }

    /// Load the manifest file. A missing file is an error.
    pub fn load(&self) -> Result<EngineManifest> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| EngineError::Io {
            message: format!("Failed to read manifest: {}", e),
            path: Some(self.path.clone()),
            source: Some(e),
        })?;

        let mut manifest: EngineManifest =
            serde_json::from_str(&content).map_err(|e| EngineError::Json {
                message: format!(
                    "Failed to parse manifest from {}: {}",
                    self.path.display(),
                    e
                ),
                source: Some(e),
            })?;

        if let Some(db) = manifest.installed_db.take() {
            manifest.installed_db = Some(expand_home_path(&db));
        }

        validate(&manifest)?;

        debug!(
            "Loaded manifest from {}: {} plugins, {} apps",
            self.path.display(),
            manifest.plugins.len(),
            manifest.apps.len()
        );

        Ok(manifest)
    }

    /// Write a manifest file (for initial setup).
    pub fn write(&self, manifest: &EngineManifest) -> Result<()> {
        validate(manifest)?;
        let content = serde_json::to_string_pretty(manifest)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| EngineError::io_with_path(e, parent))?;
            }
        }
        std::fs::write(&self.path, content).map_err(|e| EngineError::io_with_path(e, &self.path))
    }
}

/// Check ids and names: non-empty, and ids unique within their list.
pub fn validate(manifest: &EngineManifest) -> Result<()> {
    let mut seen = HashSet::new();
    for plugin in &manifest.plugins {
        if plugin.id.trim().is_empty() {
            return Err(EngineError::Config {
                message: "Plugin has empty id".to_string(),
            });
        }
        if plugin.name.trim().is_empty() {
            return Err(EngineError::Config {
                message: format!("Plugin '{}' has empty name", plugin.id),
            });
        }
        if !seen.insert(plugin.id.as_str()) {
            return Err(EngineError::Config {
                message: format!("Duplicate plugin id: {}", plugin.id),
            });
        }
    }

    let mut seen = HashSet::new();
    for app in &manifest.apps {
        if app.id.trim().is_empty() {
            return Err(EngineError::Config {
                message: "App has empty id".to_string(),
            });
        }
        if app.name.trim().is_empty() {
            return Err(EngineError::Config {
                message: format!("App '{}' has empty name", app.id),
            });
        }
        if !seen.insert(app.id.as_str()) {
            return Err(EngineError::Config {
                message: format!("Duplicate app id: {}", app.id),
            });
        }
    }

    Ok(())
}
