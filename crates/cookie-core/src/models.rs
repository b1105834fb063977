//! Response types shared by every control-plane binding.
//!
//! Field names are snake_case on the wire; the UI collaborators read
//! `plugins`, `connectable_apps` and the flattened telemetry keys directly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Engine lifecycle as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Serving requests with no shutdown pending.
    Running,
    /// A shutdown was decided and the grace period is running.
    Draining,
    /// The grace period elapsed with no connected apps; the process exits.
    Terminated,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Running => "running",
            Lifecycle::Draining => "draining",
            Lifecycle::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A plugin record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: String,
    pub name: String,
    /// Free-text operational status, e.g. "Idle" or "Error: no device".
    pub status: String,
    pub enabled: bool,
}

/// An app that may connect to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectableApp {
    pub id: String,
    pub name: String,
    pub installed: bool,
    /// Only reported for installed apps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    /// RFC 3339 timestamp of the connect that admitted the app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_since: Option<String>,
}

/// Composite snapshot built fresh for every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub plugins: Vec<Plugin>,
    pub connectable_apps: Vec<ConnectableApp>,
    pub lifecycle: Lifecycle,
    pub active_connections: usize,
    /// Auxiliary telemetry (for example `arduino_data`), flattened into the
    /// top level of the serialized state.
    #[serde(flatten)]
    pub telemetry: Map<String, Value>,
}

impl EngineState {
    /// Look up a plugin record by id.
    pub fn plugin(&self, id: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.id == id)
    }

    /// Look up an app record by id.
    pub fn app(&self, id: &str) -> Option<&ConnectableApp> {
        self.connectable_apps.iter().find(|a| a.id == id)
    }

    /// Number of plugins currently enabled.
    pub fn running_plugins(&self) -> usize {
        self.plugins.iter().filter(|p| p.enabled).count()
    }
}

/// Acknowledgement for connect/disconnect, carrying the state to re-render from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppAck {
    pub ok: bool,
    #[serde(flatten)]
    pub state: EngineState,
}

impl AppAck {
    pub fn ok(state: EngineState) -> Self {
        Self { ok: true, state }
    }
}

/// Outcome of an explicit shutdown request.
///
/// A request that leaves the engine running is not an error: `ok` stays true
/// and `reason` explains why the engine stayed alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownAck {
    pub ok: bool,
    pub shutting_down: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Grace period remaining before exit, when a drain is in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_ms: Option<u64>,
    pub lifecycle: Lifecycle,
}

impl ShutdownAck {
    /// The engine is (or already was) on its way out.
    pub fn shutting_down(lifecycle: Lifecycle, grace_period_ms: Option<u64>) -> Self {
        Self {
            ok: true,
            shutting_down: true,
            reason: None,
            grace_period_ms,
            lifecycle,
        }
    }

    /// The engine stays up, with the reason why.
    pub fn stayed_alive(reason: impl Into<String>) -> Self {
        Self {
            ok: true,
            shutting_down: false,
            reason: Some(reason.into()),
            grace_period_ms: None,
            lifecycle: Lifecycle::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_state() -> EngineState {
        let mut telemetry = Map::new();
        telemetry.insert("arduino_data".into(), json!("MOVE 1 -2"));
        EngineState {
            plugins: vec![Plugin {
                id: "cookie-joystick".into(),
                name: "CookieJoystick".into(),
                status: "Idle".into(),
                enabled: true,
            }],
            connectable_apps: vec![
                ConnectableApp {
                    id: "camcookieactions".into(),
                    name: "Camcookie Actions".into(),
                    installed: true,
                    connected: Some(false),
                    connected_since: None,
                },
                ConnectableApp {
                    id: "htmlmaker".into(),
                    name: "HTML Maker".into(),
                    installed: false,
                    connected: None,
                    connected_since: None,
                },
            ],
            lifecycle: Lifecycle::Running,
            active_connections: 0,
            telemetry,
        }
    }

    #[test]
    fn test_state_flattens_telemetry() {
        let value = serde_json::to_value(sample_state()).unwrap();
        assert_eq!(value["arduino_data"], "MOVE 1 -2");
        assert_eq!(value["lifecycle"], "running");
        assert!(value.get("telemetry").is_none());
    }

    #[test]
    fn test_uninstalled_app_omits_connected() {
        let value = serde_json::to_value(sample_state()).unwrap();
        let apps = value["connectable_apps"].as_array().unwrap();
        assert_eq!(apps[0]["connected"], false);
        assert!(apps[1].get("connected").is_none());
    }

    #[test]
    fn test_app_ack_carries_state_at_top_level() {
        let value = serde_json::to_value(AppAck::ok(sample_state())).unwrap();
        assert_eq!(value["ok"], true);
        assert!(value["plugins"].is_array());
        assert_eq!(value["arduino_data"], "MOVE 1 -2");
    }

    #[test]
    fn test_stayed_alive_ack() {
        let ack = ShutdownAck::stayed_alive("1 other app(s) still connected");
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(
            value,
            json!({
                "ok": true,
                "shutting_down": false,
                "reason": "1 other app(s) still connected",
                "lifecycle": "running"
            })
        );
    }

    #[test]
    fn test_running_plugins() {
        assert_eq!(sample_state().running_plugins(), 1);
    }
}
