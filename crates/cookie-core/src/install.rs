//! Installed-app probe.
//!
//! Which apps are installed is decided outside the engine (by the app store).
//! The engine reads that decision once at startup and never changes it.

use crate::plugins::AppSpec;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Installed-apps database written by the app store.
///
/// The file is a JSON object mapping app id to installed version.
#[derive(Debug, Default, Clone)]
pub struct InstalledDb {
    ids: HashSet<String>,
}

impl InstalledDb {
    /// An empty database: nothing is installed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read the database. A missing or unreadable file yields an empty database.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            debug!("Installed-apps database {} not found", path.display());
            return Self::empty();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Failed to read installed-apps database {}: {}",
                    path.display(),
                    e
                );
                return Self::empty();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Self {
                ids: map.keys().cloned().collect(),
            },
            Ok(_) => {
                warn!(
                    "Installed-apps database {} is not a JSON object",
                    path.display()
                );
                Self::empty()
            }
            Err(e) => {
                warn!(
                    "Failed to parse installed-apps database {}: {}",
                    path.display(),
                    e
                );
                Self::empty()
            }
        }
    }

    /// Load from an optional path.
    pub fn load_optional(path: Option<&PathBuf>) -> Self {
        path.map(Self::load).unwrap_or_default()
    }

    pub fn contains(&self, app_id: &str) -> bool {
        self.ids.contains(app_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Resolve an app's installed flag: an explicit manifest value wins.
    pub fn is_installed(&self, app: &AppSpec) -> bool {
        app.installed.unwrap_or_else(|| self.contains(&app.id))
    }
}

impl<S: Into<String>> FromIterator<S> for InstalledDb {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}
