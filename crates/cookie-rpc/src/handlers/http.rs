//! Plain HTTP query routes polled by UI collaborators and called by client
//! apps on exit (`/shutdown?app_id=...`).

use crate::server::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cookie_core::{AppAck, EngineError, EngineState, ShutdownAck};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct ToggleQuery {
    #[serde(default, alias = "pluginId", alias = "id")]
    pub plugin_id: Option<String>,
    #[serde(default)]
    pub enabled: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppQuery {
    #[serde(default, alias = "appId")]
    pub app_id: Option<String>,
}

/// Engine error rendered as `{ok: false, error, code, state?}`.
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match &err {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            EngineError::InvalidParams { .. } => StatusCode::BAD_REQUEST,
            EngineError::SideEffectFailed { .. } | EngineError::Timeout(_) => {
                StatusCode::BAD_GATEWAY
            }
            EngineError::Terminated => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("HTTP {} {}", status.as_u16(), err);

        let mut body = json!({
            "ok": false,
            "error": err.to_string(),
            "code": err.to_rpc_error_code(),
        });
        if let Some(state) = err.last_known_good() {
            body["state"] = serde_json::to_value(state).unwrap_or_default();
        }
        (status, Json(body)).into_response()
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError(EngineError::InvalidParams {
                message: format!("{} is required", name),
            })
        })
}

fn parse_enabled(value: Option<String>) -> Result<bool, ApiError> {
    let raw = required(value, "enabled")?;
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        _ => Err(ApiError(EngineError::InvalidParams {
            message: format!("enabled must be true or false, got {}", raw),
        })),
    }
}

pub async fn handle_status(State(state): State<Arc<AppState>>) -> Json<EngineState> {
    Json(state.service.status().await)
}

pub async fn handle_toggle(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ToggleQuery>,
) -> Result<Json<AppAck>, ApiError> {
    let plugin_id = required(query.plugin_id, "plugin_id")?;
    let enabled = parse_enabled(query.enabled)?;
    let engine_state = state.service.toggle_plugin(&plugin_id, enabled).await?;
    Ok(Json(AppAck::ok(engine_state)))
}

pub async fn handle_connect(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AppQuery>,
) -> Result<Json<AppAck>, ApiError> {
    let app_id = required(query.app_id, "app_id")?;
    Ok(Json(state.service.connect_app(&app_id).await?))
}

pub async fn handle_disconnect(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AppQuery>,
) -> Result<Json<AppAck>, ApiError> {
    let app_id = required(query.app_id, "app_id")?;
    Ok(Json(state.service.disconnect_app(&app_id).await))
}

/// `app_id` is optional here; it only names the requester in logs and reasons.
pub async fn handle_shutdown(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AppQuery>,
) -> Json<ShutdownAck> {
    let app_id = query.app_id.unwrap_or_else(|| "unknown".to_string());
    Json(state.service.request_shutdown(&app_id).await)
}
