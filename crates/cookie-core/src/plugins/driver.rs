//! Plugin drivers: the side effects behind enable/disable.
//!
//! The engine does not know what a plugin does. It only calls `start` and
//! `stop` through a [`PluginDriver`] and waits (bounded) for the outcome.

use super::schema::DriverSpec;
use crate::config::expand_home;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tracing::debug;

/// Side-effect interface every plugin implementation satisfies.
#[async_trait]
pub trait PluginDriver: Send + Sync + 'static {
    /// Bring the plugin up. Returns once the plugin is running or has failed.
    async fn start(&self) -> Result<()>;

    /// Bring the plugin down.
    async fn stop(&self) -> Result<()>;

    /// Live status text, if the driver tracks one.
    fn status(&self) -> Option<String> {
        None
    }
}

/// Driver with no side effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleDriver;

#[async_trait]
impl PluginDriver for IdleDriver {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Driver that runs an external program for each action.
///
/// An empty command line makes that action a no-op. The child is killed if
/// the caller stops waiting for it.
#[derive(Debug, Clone)]
pub struct CommandDriver {
    start: Vec<String>,
    stop: Vec<String>,
}

impl CommandDriver {
    pub fn new(start: Vec<String>, stop: Vec<String>) -> Self {
        Self { start, stop }
    }

    async fn run(argv: &[String]) -> Result<()> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };
        let program = expand_home(program);
        let args: Vec<String> = args.iter().map(|a| expand_home(a)).collect();

        debug!("Running plugin command: {} {:?}", program, args);

        let output = tokio::process::Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::Other(format!("Failed to run {}: {}", program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let mut message = format!("{} exited with {}", program, output.status);
            if !stderr.is_empty() {
                message.push_str(": ");
                message.push_str(stderr);
            }
            Err(EngineError::Other(message))
        }
    }
}

#[async_trait]
impl PluginDriver for CommandDriver {
    async fn start(&self) -> Result<()> {
        Self::run(&self.start).await
    }

    async fn stop(&self) -> Result<()> {
        Self::run(&self.stop).await
    }
}

/// Build the driver a manifest entry asks for.
pub fn build_driver(spec: &DriverSpec) -> Arc<dyn PluginDriver> {
    match spec {
        DriverSpec::Idle => Arc::new(IdleDriver),
        DriverSpec::Command { start, stop } => {
            Arc::new(CommandDriver::new(start.clone(), stop.clone()))
        }
    }
}
