//! Centralized configuration defaults for the plugin engine.
//!
//! Runtime values come from the engine manifest and CLI flags; the constants
//! here are the fallbacks they override.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine-level defaults.
pub struct EngineDefaults;

impl EngineDefaults {
    pub const ENGINE_NAME: &'static str = "Camcookie Plugin Engine";
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 8765;

    /// How long the engine lingers with no connected apps before exiting.
    pub const GRACE_PERIOD: Duration = Duration::from_secs(5);
    /// Upper bound on a single plugin start/stop action.
    pub const TOGGLE_TIMEOUT: Duration = Duration::from_secs(5);
    /// Interval UI collaborators are expected to poll `status` at.
    pub const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

    pub const MANIFEST_FILE_NAME: &'static str = "engine.json";
    pub const INSTALLED_DB_FILE_NAME: &'static str = ".camcookie_installed.json";
    pub const TELEMETRY_ARDUINO_KEY: &'static str = "arduino_data";
}

/// Local TCP IPC limits.
pub struct IpcConfig;

impl IpcConfig {
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
    pub const MAX_CONNECTIONS: usize = 64;
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
}

/// Runtime knobs for the control service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub grace_period: Duration,
    pub toggle_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            grace_period: EngineDefaults::GRACE_PERIOD,
            toggle_timeout: EngineDefaults::TOGGLE_TIMEOUT,
        }
    }
}

impl ServiceSettings {
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_toggle_timeout(mut self, toggle_timeout: Duration) -> Self {
        self.toggle_timeout = toggle_timeout;
        self
    }
}

/// Expand a leading `~` or any `$HOME` occurrence to the user's home directory.
///
/// Text is returned unchanged when the home directory cannot be determined.
pub fn expand_home(text: &str) -> String {
    let Some(home) = dirs::home_dir() else {
        return text.to_string();
    };
    let home = home.to_string_lossy();
    let expanded = text.replace("$HOME", &home);
    if expanded == "~" {
        home.into_owned()
    } else if let Some(rest) = expanded.strip_prefix("~/") {
        format!("{}/{}", home, rest)
    } else {
        expanded
    }
}

/// [`expand_home`] for paths.
pub fn expand_home_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_home(&path.to_string_lossy()))
}

/// Default location of the engine manifest.
pub fn default_manifest_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("camcookie").join(EngineDefaults::MANIFEST_FILE_NAME))
}

/// Default location of the installed-apps database.
pub fn default_installed_db_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(EngineDefaults::INSTALLED_DB_FILE_NAME))
}
