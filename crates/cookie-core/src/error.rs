//! Error types for the plugin engine.
//!
//! Every externally visible failure of the control plane is an
//! [`EngineError`]. Shutdown races are handled inside the shutdown module and
//! never show up here.

use crate::models::EngineState;
use std::path::PathBuf;
use thiserror::Error;

/// Which plugin side effect was being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginAction {
    Start,
    Stop,
}

impl PluginAction {
    /// The action that moves a plugin to the given enabled flag.
    pub fn for_enabled(enabled: bool) -> Self {
        if enabled {
            PluginAction::Start
        } else {
            PluginAction::Stop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginAction::Start => "start",
            PluginAction::Stop => "stop",
        }
    }
}

impl std::fmt::Display for PluginAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Plugin not found: {plugin_id}")]
    PluginNotFound { plugin_id: String },

    #[error("App not found: {app_id}")]
    AppNotFound { app_id: String },

    #[error("App is not installed: {app_id}")]
    AppNotInstalled { app_id: String },

    /// A plugin's start/stop action failed or timed out. The plugin keeps its
    /// last successfully applied `enabled` value.
    #[error("Plugin {plugin_id} failed to {action}: {message}")]
    SideEffectFailed {
        plugin_id: String,
        action: PluginAction,
        message: String,
        /// Snapshot taken under the same lock as the failed toggle.
        last_known_good: Option<Box<EngineState>>,
    },

    #[error("Engine has terminated")]
    Terminated,

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Engine unreachable at {addr}")]
    EngineUnreachable { addr: std::net::SocketAddr },

    /// Error returned by a remote engine over IPC.
    #[error("{message}")]
    Remote { code: i32, message: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl EngineError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        EngineError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// True for the unknown-id family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::PluginNotFound { .. }
                | EngineError::AppNotFound { .. }
                | EngineError::AppNotInstalled { .. }
                | EngineError::Remote { code: -32001, .. }
        )
    }

    /// The last-known-good state attached to a side-effect failure.
    pub fn last_known_good(&self) -> Option<&EngineState> {
        match self {
            EngineError::SideEffectFailed {
                last_known_good, ..
            } => last_known_good.as_deref(),
            _ => None,
        }
    }

    /// Attach a state snapshot to a side-effect failure; other errors pass through.
    pub fn with_state(self, state: EngineState) -> Self {
        match self {
            EngineError::SideEffectFailed {
                plugin_id,
                action,
                message,
                ..
            } => EngineError::SideEffectFailed {
                plugin_id,
                action,
                message,
                last_known_good: Some(Box::new(state)),
            },
            other => other,
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard codes:
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Application codes:
    /// - -32001: Unknown plugin or app
    /// - -32003: Plugin side effect failed
    /// - -32004: Engine terminated
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            EngineError::InvalidParams { .. } => -32602,
            EngineError::PluginNotFound { .. }
            | EngineError::AppNotFound { .. }
            | EngineError::AppNotInstalled { .. } => -32001,
            EngineError::SideEffectFailed { .. } | EngineError::Timeout(_) => -32003,
            EngineError::Terminated => -32004,
            EngineError::Remote { code, .. } => *code,
            _ => -32603,
        }
    }
}
