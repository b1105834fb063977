//! Cookie Core - connection lifecycle and shutdown coordination for the
//! shared Camcookie plugin engine.
//!
//! Many independent client apps share one engine process. This crate tracks
//! which apps are connected, serializes plugin enable/disable, and decides when
//! the engine may exit. It has no HTTP layer of its own; `cookie-rpc` serves it.
//!
//! # Example
//!
//! ```rust,ignore
//! use cookie_core::{ControlService, EngineManifest, InstalledDb, ServiceSettings};
//!
//! #[tokio::main]
//! async fn main() -> cookie_core::Result<()> {
//!     let manifest = EngineManifest::default();
//!     let service = ControlService::from_manifest(
//!         &manifest,
//!         &InstalledDb::empty(),
//!         manifest.settings(),
//!     )?;
//!     service.start_default_plugins().await;
//!
//!     let ack = service.request_shutdown("camcookieactions").await;
//!     println!("shutting down: {}", ack.shutting_down);
//!
//!     service.terminated().await;
//!     service.stop_all_plugins().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod install;
pub mod ipc;
pub mod ledger;
pub mod models;
pub mod plugins;
pub mod registry;
pub mod service;
pub mod shutdown;
pub mod telemetry;

pub use config::{EngineDefaults, IpcConfig, ServiceSettings};
pub use dispatch::dispatch;
pub use error::{EngineError, PluginAction, Result};
pub use install::InstalledDb;
pub use ledger::{ConnectionLedger, Membership};
pub use models::{AppAck, ConnectableApp, EngineState, Lifecycle, Plugin, ShutdownAck};
pub use plugins::{
    AppSpec, CommandDriver, DriverSpec, EngineManifest, IdleDriver, ManifestLoader,
    PluginDriver, PluginSpec,
};
pub use registry::PluginRegistry;
pub use service::ControlService;
pub use shutdown::{Decision, ShutdownCoordinator};
pub use telemetry::TelemetryBoard;
