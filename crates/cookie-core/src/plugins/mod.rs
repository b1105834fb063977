//! Plugin declarations and side-effect drivers.
//!
//! The static plugin and app sets come from a JSON manifest. Each plugin is
//! backed by a [`PluginDriver`] that performs its enable/disable side effects.

mod driver;
mod loader;
mod schema;

pub use driver::{build_driver, CommandDriver, IdleDriver, PluginDriver};
pub use loader::{validate, ManifestLoader};
pub use schema::{AppSpec, DriverSpec, EngineManifest, PluginSpec, ShutdownSpec};
