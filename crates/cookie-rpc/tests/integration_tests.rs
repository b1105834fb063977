//! Integration tests for the cookie-engine binary.
//!
//! Each test spawns the real binary on an OS-assigned port with a manifest in
//! a temp directory, drives it over HTTP, and for the lifecycle tests waits
//! for the process to exit on its own.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncBufReadExt;

/// Write a manifest with two installed apps, one uninstalled app and a short
/// grace period.
fn create_test_env() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("installed.json");
    std::fs::write(&db_path, r#"{"camcookieactions": "1.0.0", "pythonmaker": "0.9"}"#).unwrap();

    let manifest = json!({
        "plugins": [
            {"id": "cookie-joystick", "name": "CookieJoystick"},
            {"id": "arduino", "name": "ArduinoPlugin", "enabledByDefault": false}
        ],
        "apps": [
            {"id": "camcookieactions", "name": "Camcookie Actions"},
            {"id": "pythonmaker", "name": "Python Maker"},
            {"id": "htmlmaker", "name": "HTML Maker"}
        ],
        "installedDb": db_path,
        "shutdown": {"gracePeriodMs": 400}
    });
    std::fs::write(temp_dir.path().join("engine.json"), manifest.to_string()).unwrap();
    temp_dir
}

async fn get(port: u16, path: &str) -> (u16, Value) {
    let response = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}{}", port, path))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("request failed");
    let status = response.status().as_u16();
    (status, response.json::<Value>().await.expect("non-JSON body"))
}

async fn rpc_call(port: u16, method: &str, params: Value) -> Value {
    reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/rpc", port))
        .json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("request failed")
        .json::<Value>()
        .await
        .expect("non-JSON body")
}

struct EngineHandle {
    child: tokio::process::Child,
    port: u16,
    stdout_drain: Option<tokio::task::JoinHandle<()>>,
}

impl EngineHandle {
    /// Wait for the engine to exit by itself.
    async fn wait_exit(mut self, limit: Duration) -> Option<std::process::ExitStatus> {
        let status = tokio::time::timeout(limit, self.child.wait()).await.ok()?.ok();
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        status
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.start_kill();
    }
}

fn engine_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cookie-engine"))
}

/// Start the engine and wait until `/health` answers.
async fn start_engine(root: &Path) -> EngineHandle {
    let mut child = tokio::process::Command::new(engine_binary())
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg("0")
        .arg("--config")
        .arg(root.join("engine.json"))
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("failed to spawn cookie-engine");

    let stdout = child.stdout.take().expect("failed to capture stdout");
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let mut port = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(250), lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if let Some(value) = line.strip_prefix("ENGINE_PORT=") {
                    port = Some(value.trim().parse::<u16>().expect("invalid ENGINE_PORT"));
                    break;
                }
            }
            Ok(Ok(None)) | Ok(Err(_)) => break,
            Err(_) => continue,
        }
    }
    let port = port.expect("ENGINE_PORT line not emitted");

    let mut healthy = false;
    for _ in 0..50 {
        if let Ok(response) = reqwest::get(format!("http://127.0.0.1:{}/health", port)).await {
            if response.status().is_success() {
                healthy = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(healthy, "engine failed health check on port {}", port);

    let stdout_drain =
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    EngineHandle {
        child,
        port,
        stdout_drain: Some(stdout_drain),
    }
}

#[tokio::test]
async fn test_status_reflects_manifest() {
    let env = create_test_env();
    let engine = start_engine(env.path()).await;

    let (status, body) = get(engine.port, "/status").await;
    assert_eq!(status, 200);
    assert_eq!(body["plugins"][0]["enabled"], true);
    assert_eq!(body["plugins"][1]["enabled"], false);
    assert_eq!(body["arduino_data"], "None");

    let apps = body["connectable_apps"].as_array().unwrap();
    assert_eq!(apps[0]["installed"], true);
    assert_eq!(apps[0]["connected"], false);
    assert_eq!(apps[2]["installed"], false);
    assert!(apps[2].get("connected").is_none());
}

#[tokio::test]
async fn test_two_apps_then_exit() {
    let env = create_test_env();
    let engine = start_engine(env.path()).await;
    let port = engine.port;

    let (status, _) = get(port, "/connect?app_id=camcookieactions").await;
    assert_eq!(status, 200);
    let (_, body) = get(port, "/connect?app_id=pythonmaker").await;
    assert_eq!(body["active_connections"], 2);

    get(port, "/disconnect?app_id=camcookieactions").await;
    let (_, body) = get(port, "/shutdown?app_id=camcookieactions").await;
    assert_eq!(
        body,
        json!({
            "ok": true,
            "shutting_down": false,
            "reason": "1 other app(s) still connected",
            "lifecycle": "running"
        })
    );

    let (_, body) = get(port, "/disconnect?app_id=pythonmaker").await;
    assert_eq!(body["lifecycle"], "draining");

    let exit = engine.wait_exit(Duration::from_secs(10)).await;
    assert!(exit.map(|s| s.success()).unwrap_or(false), "engine did not exit cleanly");
}

#[tokio::test]
async fn test_reconnect_cancels_shutdown() {
    let env = create_test_env();
    let engine = start_engine(env.path()).await;
    let port = engine.port;

    let (_, body) = get(port, "/shutdown?app_id=camcookieactions").await;
    assert_eq!(body["shutting_down"], true);
    assert_eq!(body["lifecycle"], "draining");

    let (status, body) = get(port, "/connect?app_id=camcookieactions").await;
    assert_eq!(status, 200);
    assert_eq!(body["lifecycle"], "running");

    tokio::time::sleep(Duration::from_millis(1000)).await;
    let (status, body) = get(port, "/status").await;
    assert_eq!(status, 200);
    assert_eq!(body["lifecycle"], "running");
    assert_eq!(body["connectable_apps"][0]["connected"], true);
}

#[tokio::test]
async fn test_error_mapping() {
    let env = create_test_env();
    let engine = start_engine(env.path()).await;
    let port = engine.port;

    let (status, body) = get(port, "/toggle?plugin_id=nope&enabled=true").await;
    assert_eq!(status, 404);
    assert_eq!(body["ok"], false);

    let (status, _) = get(port, "/connect?app_id=htmlmaker").await;
    assert_eq!(status, 404);

    let (status, _) = get(port, "/connect").await;
    assert_eq!(status, 400);

    let (status, body) = get(port, "/disconnect?app_id=never-connected").await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_rpc_bridge() {
    let env = create_test_env();
    let engine = start_engine(env.path()).await;
    let port = engine.port;

    let response = rpc_call(
        port,
        "toggle_plugin",
        json!({"pluginId": "arduino", "enabled": true}),
    )
    .await;
    assert_eq!(response["result"]["ok"], true);
    assert_eq!(response["result"]["plugins"][1]["enabled"], true);

    let response = rpc_call(port, "connect_app", json!({"app_id": "pythonmaker"})).await;
    assert_eq!(response["result"]["active_connections"], 1);

    let response = rpc_call(port, "connect_app", json!({"app_id": "ghost"})).await;
    assert_eq!(response["error"]["code"], -32001);

    let response = rpc_call(port, "get_state", json!({})).await;
    assert_eq!(response["result"]["connectable_apps"][1]["connected"], true);
}
