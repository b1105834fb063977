//! Request handlers: the JSON-RPC bridge and the plain HTTP query routes.
//!
//! Both call the same `ControlService`; the JSON-RPC side goes through
//! `cookie_core::dispatch` so method names match the IPC bridge exactly.

pub mod http;

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use cookie_core::{dispatch, EngineDefaults, EngineError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }

    /// Error response for an engine failure. A failed toggle carries the
    /// last-known-good state under `data.state`.
    pub fn from_engine_error(id: Option<Value>, err: &EngineError) -> Self {
        let mut response = Self::error(id, err.to_rpc_error_code(), err.to_string());
        if let (Some(error), Some(state)) = (response.error.as_mut(), err.last_known_good()) {
            error.data = serde_json::to_value(state)
                .ok()
                .map(|state| json!({ "state": state }));
        }
        response
    }
}

/// Liveness probe.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "name": EngineDefaults::ENGINE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "poll_interval_ms": u64::try_from(EngineDefaults::STATUS_POLL_INTERVAL.as_millis())
            .unwrap_or(u64::MAX),
    }))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::error(
                id,
                -32600,
                "Invalid Request: expected jsonrpc 2.0".to_string(),
            )),
        );
    }

    let method = request.method.as_str();
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    debug!("RPC call: {}({})", method, params);

    match dispatch(&state.service, method, params).await {
        Ok(value) => (StatusCode::OK, Json(JsonRpcResponse::success(id, value))),
        Err(e) => {
            warn!("RPC error for {}: {}", method, e);
            (
                StatusCode::OK,
                Json(JsonRpcResponse::from_engine_error(id, &e)),
            )
        }
    }
}
