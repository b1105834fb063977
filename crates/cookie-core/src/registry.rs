//! Plugin registry: the static plugin set and its enabled flags.
//!
//! The registry is plain data owned by the control service and only touched
//! under the service lock. A toggle runs the plugin's side effect (bounded by
//! the toggle timeout) before the flag changes, so a returned state never
//! claims an action that is still pending.

use crate::error::{EngineError, PluginAction, Result};
use crate::models::Plugin;
use crate::plugins::{build_driver, PluginDriver, PluginSpec};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const STATUS_RUNNING: &str = "Running";
const STATUS_STOPPED: &str = "Stopped";

struct PluginEntry {
    id: String,
    name: String,
    enabled: bool,
    enabled_by_default: bool,
    /// Message of the last failed side effect; cleared by the next success.
    last_error: Option<String>,
    driver: Arc<dyn PluginDriver>,
}

impl PluginEntry {
    fn record(&self) -> Plugin {
        let status = match &self.last_error {
            Some(error) => format!("Error: {}", error),
            None => self.driver.status().unwrap_or_else(|| {
                if self.enabled {
                    STATUS_RUNNING.to_string()
                } else {
                    STATUS_STOPPED.to_string()
                }
            }),
        };
        Plugin {
            id: self.id.clone(),
            name: self.name.clone(),
            status,
            enabled: self.enabled,
        }
    }
}

/// Ordered set of plugins with their enabled state.
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
    index: HashMap<String, usize>,
    toggle_timeout: Duration,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new(toggle_timeout: Duration) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            toggle_timeout,
        }
    }

    /// Build a registry from manifest entries, in manifest order.
    ///
    /// Every plugin starts disabled; see [`PluginRegistry::start_defaults`].
    pub fn from_specs(specs: &[PluginSpec], toggle_timeout: Duration) -> Result<Self> {
        let mut registry = Self::new(toggle_timeout);
        for spec in specs {
            registry.register(
                &spec.id,
                &spec.name,
                spec.enabled_by_default,
                build_driver(&spec.driver),
            )?;
        }
        Ok(registry)
    }

    /// Add a plugin at the end of the registry order.
    pub fn register(
        &mut self,
        id: &str,
        name: &str,
        enabled_by_default: bool,
        driver: Arc<dyn PluginDriver>,
    ) -> Result<()> {
        if self.index.contains_key(id) {
            return Err(EngineError::Config {
                message: format!("Duplicate plugin id: {}", id),
            });
        }
        self.index.insert(id.to_string(), self.entries.len());
        self.entries.push(PluginEntry {
            id: id.to_string(),
            name: name.to_string(),
            enabled: false,
            enabled_by_default,
            last_error: None,
            driver,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Plugin records in registry order.
    pub fn snapshot(&self) -> Vec<Plugin> {
        self.entries.iter().map(PluginEntry::record).collect()
    }

    /// One plugin record.
    pub fn get(&self, id: &str) -> Option<Plugin> {
        self.index.get(id).map(|&i| self.entries[i].record())
    }

    /// Set a plugin's enabled flag, running its start/stop side effect first.
    ///
    /// Setting the flag a plugin already has is a no-op. On failure or timeout
    /// the flag keeps its last successfully applied value.
    pub async fn toggle(&mut self, id: &str, enabled: bool) -> Result<Plugin> {
        let slot = *self
            .index
            .get(id)
            .ok_or_else(|| EngineError::PluginNotFound {
                plugin_id: id.to_string(),
            })?;

        if self.entries[slot].enabled == enabled {
            debug!(
                "Plugin {} already {}",
                id,
                if enabled { "enabled" } else { "disabled" }
            );
            // A no-op success still clears a stale failure.
            let entry = &mut self.entries[slot];
            entry.last_error = None;
            return Ok(entry.record());
        }

        let action = PluginAction::for_enabled(enabled);
        let driver = self.entries[slot].driver.clone();
        let outcome = Self::apply(driver, action, self.toggle_timeout).await;

        let entry = &mut self.entries[slot];
        match outcome {
            Ok(()) => {
                entry.enabled = enabled;
                entry.last_error = None;
                info!(
                    "Plugin {} {}",
                    id,
                    if enabled { "enabled" } else { "disabled" }
                );
                Ok(entry.record())
            }
            Err(message) => {
                warn!("Plugin {} failed to {}: {}", id, action, message);
                entry.last_error = Some(message.clone());
                Err(EngineError::SideEffectFailed {
                    plugin_id: id.to_string(),
                    action,
                    message,
                    last_known_good: None,
                })
            }
        }
    }

    async fn apply(
        driver: Arc<dyn PluginDriver>,
        action: PluginAction,
        limit: Duration,
    ) -> std::result::Result<(), String> {
        let work = async {
            match action {
                PluginAction::Start => driver.start().await,
                PluginAction::Stop => driver.stop().await,
            }
        };
        match tokio::time::timeout(limit, work).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}ms", limit.as_millis())),
        }
    }

    /// Start every plugin marked enabled-by-default. Failures are logged and
    /// leave the plugin disabled. Returns how many started.
    pub async fn start_defaults(&mut self) -> usize {
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.enabled_by_default && !e.enabled)
            .map(|e| e.id.clone())
            .collect();

        let mut started = 0;
        for id in ids {
            if self.toggle(&id, true).await.is_ok() {
                started += 1;
            }
        }
        started
    }

    /// Stop every enabled plugin, best effort.
    pub async fn stop_all(&mut self) {
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.id.clone())
            .collect();

        for id in ids {
            if let Err(e) = self.toggle(&id, false).await {
                warn!("Plugin {} did not stop cleanly: {}", id, e);
            }
        }
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.snapshot())
            .field("toggle_timeout", &self.toggle_timeout)
            .finish()
    }
}
