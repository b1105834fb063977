//! Engine manifest schema.
//!
//! Defines the structure of the JSON file that declares the static plugin
//! set, the connectable apps and the shutdown timings for one engine run.

use crate::config::{EngineDefaults, ServiceSettings};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// How a plugin's enable/disable side effects are carried out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DriverSpec {
    /// No side effects; the status text follows the enabled flag.
    Idle,
    /// Run an external program to start and to stop the plugin.
    Command {
        /// Program followed by its arguments.
        #[serde(default)]
        start: Vec<String>,
        #[serde(default)]
        stop: Vec<String>,
    },
}

impl Default for DriverSpec {
    fn default() -> Self {
        DriverSpec::Idle
    }
}

/// A plugin declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSpec {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled_by_default: bool,
    #[serde(default)]
    pub driver: DriverSpec,
}

/// An app that may connect to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    pub id: String,
    pub name: String,
    /// Fixed installed flag. When absent the installed-apps database decides.
    #[serde(default)]
    pub installed: Option<bool>,
}

/// Shutdown timing overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownSpec {
    #[serde(default)]
    pub grace_period_ms: Option<u64>,
    #[serde(default)]
    pub toggle_timeout_ms: Option<u64>,
}

/// Full manifest for one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineManifest {
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
    #[serde(default)]
    pub apps: Vec<AppSpec>,
    /// Installed-apps database; `~` and `$HOME` are expanded.
    #[serde(default)]
    pub installed_db: Option<PathBuf>,
    #[serde(default)]
    pub shutdown: ShutdownSpec,
    /// Initial auxiliary telemetry values.
    #[serde(default = "default_telemetry")]
    pub telemetry: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

fn default_telemetry() -> Map<String, Value> {
    let mut telemetry = Map::new();
    telemetry.insert(
        EngineDefaults::TELEMETRY_ARDUINO_KEY.to_string(),
        Value::String("None".to_string()),
    );
    telemetry
}

impl Default for EngineManifest {
    /// The stock hardware engine: joystick and Arduino plugins, no apps.
    fn default() -> Self {
        Self {
            plugins: vec![
                PluginSpec {
                    id: "cookie-joystick".to_string(),
                    name: "CookieJoystick".to_string(),
                    enabled_by_default: true,
                    driver: DriverSpec::Idle,
                },
                PluginSpec {
                    id: "arduino".to_string(),
                    name: "ArduinoPlugin".to_string(),
                    enabled_by_default: true,
                    driver: DriverSpec::Idle,
                },
            ],
            apps: Vec::new(),
            installed_db: None,
            shutdown: ShutdownSpec::default(),
            telemetry: default_telemetry(),
        }
    }
}

impl EngineManifest {
    /// Service settings with the manifest's overrides applied.
    pub fn settings(&self) -> ServiceSettings {
        let mut settings = ServiceSettings::default();
        if let Some(ms) = self.shutdown.grace_period_ms {
            settings = settings.with_grace_period(Duration::from_millis(ms));
        }
        if let Some(ms) = self.shutdown.toggle_timeout_ms {
            settings = settings.with_toggle_timeout(Duration::from_millis(ms));
        }
        settings
    }
}
