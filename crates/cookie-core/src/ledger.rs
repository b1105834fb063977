//! Connection ledger: which apps are currently connected.
//!
//! Membership, not a count: connecting an app twice leaves one entry, and
//! disconnecting an absent app is a successful no-op. The ledger also holds
//! the fixed catalog of connectable apps so it can render their records.

use crate::error::{EngineError, Result};
use crate::install::InstalledDb;
use crate::models::ConnectableApp;
use crate::plugins::AppSpec;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};

/// Result of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// The set changed.
    Changed,
    /// The set already had the requested membership.
    Unchanged,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    id: String,
    name: String,
    installed: bool,
}

/// Set of connected app ids plus the catalog they are drawn from.
#[derive(Debug, Default)]
pub struct ConnectionLedger {
    catalog: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
    connected: BTreeMap<String, DateTime<Utc>>,
}

impl ConnectionLedger {
    /// Build the ledger from manifest apps, resolving installed flags once.
    pub fn new(apps: &[AppSpec], installed: &InstalledDb) -> Self {
        let mut ledger = Self::default();
        for app in apps {
            if ledger.index.contains_key(&app.id) {
                continue;
            }
            ledger.index.insert(app.id.clone(), ledger.catalog.len());
            ledger.catalog.push(CatalogEntry {
                id: app.id.clone(),
                name: app.name.clone(),
                installed: installed.is_installed(app),
            });
        }
        ledger
    }

    /// Admit an app. Fails for unknown or uninstalled apps; idempotent otherwise.
    pub fn connect(&mut self, app_id: &str) -> Result<Membership> {
        let entry = self
            .index
            .get(app_id)
            .map(|&i| &self.catalog[i])
            .ok_or_else(|| EngineError::AppNotFound {
                app_id: app_id.to_string(),
            })?;
        if !entry.installed {
            return Err(EngineError::AppNotInstalled {
                app_id: app_id.to_string(),
            });
        }
        if self.connected.contains_key(app_id) {
            return Ok(Membership::Unchanged);
        }
        self.connected.insert(app_id.to_string(), Utc::now());
        Ok(Membership::Changed)
    }

    /// Remove an app. Never fails.
    pub fn disconnect(&mut self, app_id: &str) -> Membership {
        match self.connected.remove(app_id) {
            Some(_) => Membership::Changed,
            None => Membership::Unchanged,
        }
    }

    pub fn active_count(&self) -> usize {
        self.connected.len()
    }

    pub fn is_connected(&self, app_id: &str) -> bool {
        self.connected.contains_key(app_id)
    }

    /// True if the id names an app in the catalog, installed or not.
    pub fn is_known(&self, app_id: &str) -> bool {
        self.index.contains_key(app_id)
    }

    /// Connected ids in sorted order.
    pub fn connected_ids(&self) -> Vec<String> {
        self.connected.keys().cloned().collect()
    }

    /// App records in catalog order.
    pub fn apps(&self) -> Vec<ConnectableApp> {
        self.catalog
            .iter()
            .map(|entry| {
                let since = self.connected.get(&entry.id);
                ConnectableApp {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                    installed: entry.installed,
                    connected: entry.installed.then(|| since.is_some()),
                    connected_since: since
                        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
                }
            })
            .collect()
    }

    /// Check that every member is an installed catalog app.
    pub fn verify(&self) -> std::result::Result<(), String> {
        for id in self.connected.keys() {
            match self.index.get(id).map(|&i| &self.catalog[i]) {
                None => return Err(format!("ledger holds unknown app {}", id)),
                Some(entry) if !entry.installed => {
                    return Err(format!("ledger holds uninstalled app {}", id))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
