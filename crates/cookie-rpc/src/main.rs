//! Cookie Engine - the shared Camcookie plugin engine process.
//!
//! Serves the control API over HTTP (query routes plus a JSON-RPC bridge) and,
//! optionally, over local TCP IPC. Exits on its own once every client app has
//! disconnected and the grace period has passed.

mod handlers;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use cookie_core::config::{default_installed_db_path, default_manifest_path};
use cookie_core::ipc::IpcServer;
use cookie_core::{ControlService, EngineDefaults, InstalledDb, ManifestLoader};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "cookie-engine")]
#[command(about = "Shared plugin engine for Camcookie apps")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value_t = EngineDefaults::DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = EngineDefaults::DEFAULT_HOST)]
    host: String,

    /// Engine manifest (plugins, apps, shutdown timings)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the shutdown grace period
    #[arg(long)]
    grace_period_ms: Option<u64>,

    /// Override the per-toggle side-effect timeout
    #[arg(long)]
    toggle_timeout_ms: Option<u64>,

    /// Also serve the local TCP IPC bridge
    #[arg(long)]
    ipc: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact();

    match EnvFilter::try_from_default_env() {
        Ok(filter) => builder.with_env_filter(filter).init(),
        Err(_) => {
            let level = if debug { Level::DEBUG } else { Level::INFO };
            builder.with_max_level(level).init()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    info!("Starting {}", EngineDefaults::ENGINE_NAME);

    let manifest_path = args
        .config
        .clone()
        .or_else(default_manifest_path)
        .context("No manifest path given and no config directory available")?;
    let manifest = ManifestLoader::new(&manifest_path).load_or_default()?;

    let mut settings = manifest.settings();
    if let Some(ms) = args.grace_period_ms {
        settings = settings.with_grace_period(Duration::from_millis(ms));
    }
    if let Some(ms) = args.toggle_timeout_ms {
        settings = settings.with_toggle_timeout(Duration::from_millis(ms));
    }

    let installed_db = manifest.installed_db.clone().or_else(default_installed_db_path);
    let installed = InstalledDb::load_optional(installed_db.as_ref());
    info!(
        "{} plugin(s), {} app(s), {} installed; grace period {}ms",
        manifest.plugins.len(),
        manifest.apps.len(),
        installed.len(),
        settings.grace_period.as_millis()
    );

    let service = ControlService::from_manifest(&manifest, &installed, settings)?;
    service.start_default_plugins().await;

    let server = server::start_server(service.clone(), &args.host, args.port).await?;

    // Client apps read this line to find the engine
    println!("ENGINE_PORT={}", server.addr().port());

    let mut ipc = if args.ipc {
        let handle = IpcServer::start(service.clone()).await?;
        println!("IPC_PORT={}", handle.port());
        Some(handle)
    } else {
        None
    };

    info!("Engine running on {}", server.addr());

    tokio::select! {
        _ = service.terminated() => {
            info!("All apps gone; engine terminating");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received, exiting");
        }
    }

    service.stop_all_plugins().await;
    if let Some(handle) = ipc.as_mut() {
        handle.shutdown();
    }
    server.shutdown().await;

    info!("Engine stopped");
    Ok(())
}
