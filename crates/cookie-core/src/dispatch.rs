//! Method-name router shared by the JSON-RPC and IPC bindings.
//!
//! Method names follow the UI bridge: `get_state`, `toggle_plugin`,
//! `connect_app`, `disconnect_app`, plus `request_shutdown` and `ping`.
//! Parameter keys may be snake_case or camelCase.

use crate::error::{EngineError, Result};
use crate::models::AppAck;
use crate::service::ControlService;
use serde_json::Value;
use tracing::debug;

/// Run one named operation against the service and serialize its result.
pub async fn dispatch(service: &ControlService, method: &str, params: Value) -> Result<Value> {
    debug!("dispatch {} {}", method, params);
    match method {
        "get_state" | "get_status" | "status" => {
            Ok(serde_json::to_value(service.status().await)?)
        }
        "toggle_plugin" => {
            let plugin_id = require_str(&params, &["plugin_id", "pluginId", "id"])?;
            let enabled = require_bool(&params, "enabled")?;
            let state = service.toggle_plugin(plugin_id, enabled).await?;
            Ok(serde_json::to_value(AppAck::ok(state))?)
        }
        "connect_app" => {
            let app_id = require_str(&params, APP_ID_KEYS)?;
            Ok(serde_json::to_value(service.connect_app(app_id).await?)?)
        }
        "disconnect_app" => {
            let app_id = require_str(&params, APP_ID_KEYS)?;
            Ok(serde_json::to_value(service.disconnect_app(app_id).await)?)
        }
        "request_shutdown" | "shutdown" => {
            let app_id = app_id_param(&params).unwrap_or("unknown");
            Ok(serde_json::to_value(service.request_shutdown(app_id).await)?)
        }
        "ping" => Ok(Value::String("pong".to_string())),
        _ => Err(EngineError::InvalidParams {
            message: format!("Unknown method: {}", method),
        }),
    }
}

/// The `app_id` a call names, under either key spelling.
pub(crate) fn app_id_param(params: &Value) -> Option<&str> {
    optional_str(params, APP_ID_KEYS)
}

const APP_ID_KEYS: &[&str] = &["app_id", "appId"];

fn optional_str<'a>(params: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| params.get(*key).and_then(Value::as_str))
}

fn require_str<'a>(params: &'a Value, keys: &[&str]) -> Result<&'a str> {
    optional_str(params, keys).ok_or_else(|| EngineError::InvalidParams {
        message: format!("{} is required", keys[0]),
    })
}

/// Accepts a JSON bool or the strings "true"/"false".
fn require_bool(params: &Value, key: &str) -> Result<bool> {
    match params.get(key) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
        Some(other) => Err(EngineError::InvalidParams {
            message: format!("{} must be a boolean, got {}", key, other),
        }),
        None => Err(EngineError::InvalidParams {
            message: format!("{} is required", key),
        }),
    }
}
