//! Lifecycle tests through the public `ControlService` interface.
//!
//! Paused-clock tests cover the grace period deterministically; the race
//! tests run on the multi-thread runtime with real time.

use cookie_core::{
    AppSpec, ControlService, EngineError, EngineManifest, InstalledDb, Lifecycle,
    ManifestLoader, ServiceSettings,
};
use std::time::Duration;
use tempfile::TempDir;

const GRACE: Duration = Duration::from_secs(5);

fn app(id: &str) -> AppSpec {
    AppSpec {
        id: id.to_string(),
        name: id.to_uppercase(),
        installed: Some(true),
    }
}

fn service_with(apps: &[&str], grace: Duration) -> ControlService {
    let manifest = EngineManifest {
        apps: apps.iter().map(|id| app(id)).collect(),
        ..EngineManifest::default()
    };
    ControlService::from_manifest(
        &manifest,
        &InstalledDb::empty(),
        ServiceSettings::default().with_grace_period(grace),
    )
    .unwrap()
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_apps_scenario() {
    let service = service_with(&["a", "b"], GRACE);

    service.connect_app("a").await.unwrap();
    service.connect_app("b").await.unwrap();
    let state = service.status().await;
    assert_eq!(state.active_connections, 2);
    assert_eq!(state.app("a").unwrap().connected, Some(true));
    assert_eq!(state.app("b").unwrap().connected, Some(true));

    service.disconnect_app("a").await;
    let ack = service.request_shutdown("a").await;
    let value = serde_json::to_value(&ack).unwrap();
    assert_eq!(value["ok"], true);
    assert_eq!(value["shutting_down"], false);
    assert_eq!(value["reason"], "1 other app(s) still connected");

    service.disconnect_app("b").await;
    assert_eq!(service.lifecycle(), Lifecycle::Draining);

    tokio::time::advance(GRACE + Duration::from_millis(1)).await;
    service.terminated().await;
    assert_eq!(service.lifecycle(), Lifecycle::Terminated);
    assert_eq!(service.active_count().await, 0);
}

#[tokio::test]
async fn test_toggle_scenario() {
    let service = service_with(&[], GRACE);
    let before = service.status().await;

    let after = service.toggle_plugin("cookie-joystick", true).await.unwrap();
    assert!(after.plugin("cookie-joystick").unwrap().enabled);
    assert_eq!(after.plugin("arduino"), before.plugin("arduino"));
    assert_eq!(service.status().await, after);
}

#[tokio::test]
async fn test_toggle_unknown_scenario() {
    let service = service_with(&["a"], GRACE);
    service.connect_app("a").await.unwrap();
    let before = service.status().await;

    let err = service.toggle_plugin("p-unknown", true).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(service.status().await, before);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_connect_and_disconnect_are_idempotent() {
    let service = service_with(&["a", "b"], GRACE);
    service.connect_app("b").await.unwrap();

    service.connect_app("a").await.unwrap();
    let once = service.status().await;
    service.connect_app("a").await.unwrap();
    assert_eq!(service.status().await, once);
    assert_eq!(service.active_count().await, 2);

    service.disconnect_app("a").await;
    let once = service.status().await;
    service.disconnect_app("a").await;
    assert_eq!(service.status().await, once);
    assert_eq!(service.active_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_never_terminates_with_connected_apps() {
    let apps = ["a", "b", "c"];
    let service = service_with(&apps, Duration::from_millis(300));

    // Deterministic pseudo-random walk over connect/disconnect/shutdown with
    // clock advances in between.
    let mut seed: u64 = 0x5eed;
    for _ in 0..400 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let id = apps[(seed >> 33) as usize % apps.len()];
        match (seed >> 40) % 4 {
            0 | 1 => {
                let _ = service.connect_app(id).await;
            }
            2 => {
                service.disconnect_app(id).await;
            }
            _ => {
                service.request_shutdown(id).await;
            }
        }
        tokio::time::advance(Duration::from_millis((seed >> 50) % 200)).await;
        settle().await;

        let state = service.status().await;
        if state.lifecycle != Lifecycle::Running {
            assert_eq!(state.active_connections, 0);
        }
        assert_eq!(
            state.active_connections,
            state
                .connectable_apps
                .iter()
                .filter(|a| a.connected == Some(true))
                .count()
        );
        if state.lifecycle == Lifecycle::Terminated {
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_quiet_engine_reaches_terminated() {
    let service = service_with(&["a"], GRACE);
    service.connect_app("a").await.unwrap();
    service.disconnect_app("a").await;

    // Repeated shutdown requests while draining do not restart the clock.
    tokio::time::advance(Duration::from_secs(3)).await;
    let ack = service.request_shutdown("a").await;
    assert!(ack.shutting_down);
    assert_eq!(ack.grace_period_ms, Some(2000));

    tokio::time::advance(Duration::from_secs(2)).await;
    service.terminated().await;
}

#[tokio::test(start_paused = true)]
async fn test_engine_without_clients_stays_up_until_asked() {
    let service = service_with(&["a"], GRACE);
    tokio::time::advance(GRACE * 10).await;
    settle().await;
    assert_eq!(service.lifecycle(), Lifecycle::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connect_racing_grace_expiry() {
    for round in 0..25u64 {
        let grace = Duration::from_millis(5);
        let service = service_with(&["a"], grace);
        service.request_shutdown("x").await;

        // Aim the connect at the timer's deadline.
        tokio::time::sleep(grace + Duration::from_micros(round * 200) - Duration::from_millis(2)).await;
        let connect = {
            let service = service.clone();
            tokio::spawn(async move { service.connect_app("a").await })
        };
        let outcome = connect.await.unwrap();

        tokio::time::sleep(grace * 3).await;
        match outcome {
            Ok(ack) => {
                assert_eq!(ack.state.lifecycle, Lifecycle::Running);
                assert_eq!(service.lifecycle(), Lifecycle::Running);
                assert!(service.is_connected("a").await);
            }
            Err(EngineError::Terminated) => {
                assert_eq!(service.lifecycle(), Lifecycle::Terminated);
                assert_eq!(service.active_count().await, 0);
            }
            Err(other) => panic!("unexpected connect failure: {}", other),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_keep_ledger_consistent() {
    let ids: Vec<String> = (0..16).map(|i| format!("app{}", i)).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let service = service_with(&refs, Duration::from_secs(60));

    let tasks = ids.iter().cloned().map(|id| {
        let service = service.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                service.connect_app(&id).await.unwrap();
                let _ = service.status().await;
                service.disconnect_app(&id).await;
            }
            service.connect_app(&id).await.unwrap();
        })
    });
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    let state = service.status().await;
    assert_eq!(state.active_connections, 16);
    assert_eq!(state.lifecycle, Lifecycle::Running);
}

#[tokio::test]
async fn test_manifest_and_installed_db_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("installed.json");
    std::fs::write(&db_path, r#"{"camcookieactions": "1.0.0"}"#).unwrap();

    let manifest_path = temp_dir.path().join("engine.json");
    let manifest = serde_json::json!({
        "plugins": [
            {"id": "cookie-joystick", "name": "CookieJoystick", "enabledByDefault": true},
            {"id": "arduino", "name": "ArduinoPlugin", "enabledByDefault": false}
        ],
        "apps": [
            {"id": "camcookieactions", "name": "Camcookie Actions"},
            {"id": "htmlmaker", "name": "HTML Maker"}
        ],
        "installedDb": db_path,
        "shutdown": {"gracePeriodMs": 250}
    });
    std::fs::write(&manifest_path, manifest.to_string()).unwrap();

    let manifest = ManifestLoader::new(&manifest_path).load().unwrap();
    let installed = InstalledDb::load_optional(manifest.installed_db.as_ref());
    let service =
        ControlService::from_manifest(&manifest, &installed, manifest.settings()).unwrap();
    assert_eq!(service.settings().grace_period, Duration::from_millis(250));

    assert_eq!(service.start_default_plugins().await, 1);
    let state = service.status().await;
    assert!(state.plugin("cookie-joystick").unwrap().enabled);
    assert!(!state.plugin("arduino").unwrap().enabled);
    assert!(state.app("camcookieactions").unwrap().installed);
    assert!(!state.app("htmlmaker").unwrap().installed);

    assert!(service.connect_app("camcookieactions").await.is_ok());
    assert!(matches!(
        service.connect_app("htmlmaker").await,
        Err(EngineError::AppNotInstalled { .. })
    ));
}

#[tokio::test]
async fn test_telemetry_flows_into_state() {
    let service = service_with(&[], GRACE);
    service.telemetry().publish("arduino_data", "MOVE 4 -1");

    let value = serde_json::to_value(service.status().await).unwrap();
    assert_eq!(value["arduino_data"], "MOVE 4 -1");
}
