//! TCP IPC client used by client apps to talk to a running engine.
//!
//! Calls are serialized over a single connection with a tokio `Mutex`, so one
//! client may be shared between tasks. A call that does not finish its
//! exchange (an I/O error, or its future dropped between request and reply)
//! closes the connection; every later call fails with `EngineUnreachable`
//! and the caller reconnects.

use super::protocol::{read_frame, write_frame, IpcRequest, IpcResponse};
use crate::config::IpcConfig;
use crate::error::{EngineError, Result};
use crate::models::{AppAck, EngineState, ShutdownAck};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Connection to an engine's IPC server.
#[derive(Debug)]
pub struct IpcClient {
    /// `None` once an exchange was left unfinished.
    stream: Mutex<Option<TcpStream>>,
    addr: SocketAddr,
    next_id: AtomicU64,
}

impl IpcClient {
    /// Connect, giving up after [`IpcConfig::CONNECT_TIMEOUT`].
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = tokio::time::timeout(IpcConfig::CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| EngineError::EngineUnreachable { addr })?
            .map_err(|_| EngineError::EngineUnreachable { addr })?;

        debug!("IPC client connected to {}", addr);

        Ok(Self {
            stream: Mutex::new(Some(stream)),
            addr,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Call a method and return its raw result.
    ///
    /// Engine-side failures come back as [`EngineError::Remote`] with the
    /// engine's error code; a broken connection is `EngineUnreachable`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request_bytes = serde_json::to_vec(&IpcRequest::new(method, params, id))?;
        let lost = || EngineError::EngineUnreachable { addr: self.addr };

        // Owned by this call until the reply is read.
        let mut slot = self.stream.lock().await;
        let mut stream = slot.take().ok_or_else(lost)?;
        let response_bytes = Self::exchange(&mut stream, &request_bytes)
            .await
            .map_err(|_| lost())?
            .ok_or_else(lost)?;
        *slot = Some(stream);
        drop(slot);

        let response: IpcResponse =
            serde_json::from_slice(&response_bytes).map_err(|e| EngineError::Json {
                message: format!("Failed to parse IPC response: {}", e),
                source: Some(e),
            })?;

        if let Some(err) = response.error {
            return Err(EngineError::Remote {
                code: err.code,
                message: err.message,
            });
        }

        response
            .result
            .ok_or_else(|| EngineError::Other("IPC response missing result".to_string()))
    }

    async fn exchange(stream: &mut TcpStream, request: &[u8]) -> Result<Option<Vec<u8>>> {
        let (mut reader, mut writer) = stream.split();
        write_frame(&mut writer, request).await?;
        read_frame(&mut reader).await
    }

    /// False once the connection was closed by a failed or abandoned call.
    pub async fn is_open(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    async fn call_typed<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn status(&self) -> Result<EngineState> {
        self.call_typed("get_state", json!({})).await
    }

    pub async fn toggle_plugin(&self, plugin_id: &str, enabled: bool) -> Result<AppAck> {
        self.call_typed(
            "toggle_plugin",
            json!({ "plugin_id": plugin_id, "enabled": enabled }),
        )
        .await
    }

    pub async fn connect_app(&self, app_id: &str) -> Result<AppAck> {
        self.call_typed("connect_app", json!({ "app_id": app_id })).await
    }

    pub async fn disconnect_app(&self, app_id: &str) -> Result<AppAck> {
        self.call_typed("disconnect_app", json!({ "app_id": app_id })).await
    }

    pub async fn request_shutdown(&self, app_id: &str) -> Result<ShutdownAck> {
        self.call_typed("request_shutdown", json!({ "app_id": app_id }))
            .await
    }
}
