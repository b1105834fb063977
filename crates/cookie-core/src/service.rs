//! Control service: the single front door to the engine's state.
//!
//! Every binding (in-process calls, the HTTP routes, JSON-RPC, the TCP IPC
//! bridge) goes through one [`ControlService`]. The plugin registry, the
//! connection ledger and the shutdown coordinator live together in one
//! [`EngineCore`] behind one async mutex, so a snapshot always reflects whole
//! operations only.
//!
//! The grace-period timer is the one piece of work that runs outside the
//! lock. When it fires it re-acquires the lock and lets the coordinator
//! re-check the drain epoch and the ledger before terminating.

use crate::config::ServiceSettings;
use crate::error::{EngineError, Result};
use crate::install::InstalledDb;
use crate::ledger::{ConnectionLedger, Membership};
use crate::models::{AppAck, EngineState, Lifecycle, ShutdownAck};
use crate::plugins::EngineManifest;
use crate::registry::PluginRegistry;
use crate::shutdown::{Decision, RaceLost, ShutdownCoordinator};
use crate::telemetry::TelemetryBoard;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// State guarded by the service lock.
#[derive(Debug)]
struct EngineCore {
    registry: PluginRegistry,
    ledger: ConnectionLedger,
    shutdown: ShutdownCoordinator,
    /// Grace timer of the current drain, if one is pending.
    drain_task: Option<JoinHandle<()>>,
}

impl EngineCore {
    fn state(&self, telemetry: &TelemetryBoard) -> EngineState {
        EngineState {
            plugins: self.registry.snapshot(),
            connectable_apps: self.ledger.apps(),
            lifecycle: self.shutdown.lifecycle(),
            active_connections: self.ledger.active_count(),
            telemetry: telemetry.snapshot(),
        }
    }

    /// Abort with a state dump if the ledger and lifecycle disagree.
    fn assert_consistent(&self) {
        let lifecycle = self.shutdown.lifecycle();
        let problem = if lifecycle != Lifecycle::Running && self.ledger.active_count() > 0 {
            Some(format!(
                "{} with {} connected app(s): {:?}",
                lifecycle,
                self.ledger.active_count(),
                self.ledger.connected_ids()
            ))
        } else {
            self.ledger.verify().err()
        };

        if let Some(problem) = problem {
            error!("Engine invariant violated: {}", problem);
            error!("Engine state dump: {:#?}", self);
            std::process::abort();
        }
    }
}

/// Shared handle to the engine. Cloning is cheap and every clone sees the
/// same state.
#[derive(Clone)]
pub struct ControlService {
    core: Arc<Mutex<EngineCore>>,
    telemetry: TelemetryBoard,
    lifecycle_tx: Arc<watch::Sender<Lifecycle>>,
    settings: ServiceSettings,
}

impl ControlService {
    /// Assemble a service from already-built parts.
    pub fn new(
        registry: PluginRegistry,
        ledger: ConnectionLedger,
        telemetry: TelemetryBoard,
        settings: ServiceSettings,
    ) -> Self {
        let (lifecycle_tx, _) = watch::channel(Lifecycle::Running);
        Self {
            core: Arc::new(Mutex::new(EngineCore {
                registry,
                ledger,
                shutdown: ShutdownCoordinator::new(settings.grace_period),
                drain_task: None,
            })),
            telemetry,
            lifecycle_tx: Arc::new(lifecycle_tx),
            settings,
        }
    }

    /// Build a service from a manifest and the installed-apps database.
    ///
    /// Plugins start disabled; call [`ControlService::start_default_plugins`]
    /// to bring up the ones enabled by default.
    pub fn from_manifest(
        manifest: &EngineManifest,
        installed: &InstalledDb,
        settings: ServiceSettings,
    ) -> Result<Self> {
        let registry = PluginRegistry::from_specs(&manifest.plugins, settings.toggle_timeout)?;
        let ledger = ConnectionLedger::new(&manifest.apps, installed);
        let telemetry = TelemetryBoard::new(manifest.telemetry.clone());
        Ok(Self::new(registry, ledger, telemetry, settings))
    }

    pub fn settings(&self) -> ServiceSettings {
        self.settings
    }

    /// Board that drivers and embedders publish auxiliary readings to.
    pub fn telemetry(&self) -> &TelemetryBoard {
        &self.telemetry
    }

    /// Start every plugin enabled by default. Returns how many started.
    pub async fn start_default_plugins(&self) -> usize {
        let mut core = self.core.lock().await;
        let started = core.registry.start_defaults().await;
        info!(
            "Started {} of {} plugin(s)",
            started,
            core.registry.len()
        );
        started
    }

    /// Stop every enabled plugin, best effort.
    pub async fn stop_all_plugins(&self) {
        let mut core = self.core.lock().await;
        core.registry.stop_all().await;
    }

    /// Current composite snapshot. Never fails.
    pub async fn status(&self) -> EngineState {
        let core = self.core.lock().await;
        core.state(&self.telemetry)
    }

    /// Enable or disable a plugin and return the updated state.
    ///
    /// A failed side effect returns [`EngineError::SideEffectFailed`] carrying
    /// the state taken under the same lock.
    pub async fn toggle_plugin(&self, plugin_id: &str, enabled: bool) -> Result<EngineState> {
        let mut core = self.core.lock().await;
        core.shutdown.ensure_accepting()?;

        let outcome = core.registry.toggle(plugin_id, enabled).await;
        match outcome {
            Ok(_) => Ok(core.state(&self.telemetry)),
            Err(e) => {
                let state = core.state(&self.telemetry);
                Err(e.with_state(state))
            }
        }
    }

    /// Admit an app. Cancels a pending drain.
    pub async fn connect_app(&self, app_id: &str) -> Result<AppAck> {
        let mut core = self.core.lock().await;
        core.shutdown.ensure_accepting()?;

        if core.ledger.connect(app_id)? == Membership::Changed {
            info!(
                "App {} connected ({} active)",
                app_id,
                core.ledger.active_count()
            );
        } else {
            debug!("App {} was already connected", app_id);
        }

        let active = core.ledger.active_count();
        if let Some(epoch) = core.shutdown.on_connect(active) {
            if let Some(timer) = core.drain_task.take() {
                timer.abort();
            }
            info!("Shutdown drain {} cancelled by {}", epoch, app_id);
            self.lifecycle_tx.send_replace(Lifecycle::Running);
        }

        core.assert_consistent();
        Ok(AppAck::ok(core.state(&self.telemetry)))
    }

    /// Remove an app. Idempotent; starts a drain when the last app leaves.
    pub async fn disconnect_app(&self, app_id: &str) -> AppAck {
        let mut core = self.core.lock().await;

        match core.ledger.disconnect(app_id) {
            Membership::Changed => info!(
                "App {} disconnected ({} active)",
                app_id,
                core.ledger.active_count()
            ),
            Membership::Unchanged => debug!("App {} was not connected", app_id),
        }

        let active = core.ledger.active_count();
        let decision = core.shutdown.evaluate(active);
        self.apply_decision(&mut core, decision);

        core.assert_consistent();
        AppAck::ok(core.state(&self.telemetry))
    }

    /// Ask the engine to exit.
    ///
    /// `app_id` is only used for logging and for wording the reason. With apps
    /// still connected the engine stays up and says why.
    pub async fn request_shutdown(&self, app_id: &str) -> ShutdownAck {
        let mut core = self.core.lock().await;

        let active = core.ledger.active_count();
        let decision = core.shutdown.evaluate(active);
        self.apply_decision(&mut core, decision);
        core.assert_consistent();

        match decision {
            Decision::StayAlive { active } => {
                let others = if core.ledger.is_connected(app_id) {
                    active - 1
                } else {
                    active
                };
                let reason = if others == 0 {
                    format!("{} is still connected", app_id)
                } else {
                    format!("{} other app(s) still connected", others)
                };
                info!("Shutdown requested by {}: staying alive, {}", app_id, reason);
                ShutdownAck::stayed_alive(reason)
            }
            Decision::BeginDrain { grace_period, .. } => {
                info!("Shutdown requested by {}", app_id);
                ShutdownAck::shutting_down(Lifecycle::Draining, Some(millis(grace_period)))
            }
            Decision::AlreadyDraining { remaining, .. } => {
                debug!("Shutdown requested by {} while draining", app_id);
                ShutdownAck::shutting_down(Lifecycle::Draining, Some(millis(remaining)))
            }
            Decision::AlreadyTerminated => {
                ShutdownAck::shutting_down(Lifecycle::Terminated, None)
            }
        }
    }

    pub async fn active_count(&self) -> usize {
        self.core.lock().await.ledger.active_count()
    }

    pub async fn is_connected(&self, app_id: &str) -> bool {
        self.core.lock().await.ledger.is_connected(app_id)
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle_tx.borrow()
    }

    /// Receiver that sees every lifecycle change.
    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle_tx.subscribe()
    }

    /// Resolves once the engine has terminated.
    pub async fn terminated(&self) {
        let mut rx = self.lifecycle_tx.subscribe();
        let _ = rx.wait_for(|l| *l == Lifecycle::Terminated).await;
    }

    fn apply_decision(&self, core: &mut EngineCore, decision: Decision) {
        match decision {
            Decision::BeginDrain {
                epoch,
                grace_period,
            } => {
                info!(
                    "No apps connected; shutting down in {}ms unless one connects",
                    grace_period.as_millis()
                );
                let timer = self.spawn_grace_timer(epoch, grace_period);
                if let Some(stale) = core.drain_task.replace(timer) {
                    stale.abort();
                }
                self.lifecycle_tx.send_replace(Lifecycle::Draining);
            }
            Decision::StayAlive { active } => {
                debug!("{} app(s) still connected", active);
            }
            Decision::AlreadyDraining { .. } | Decision::AlreadyTerminated => {}
        }
    }

    fn spawn_grace_timer(&self, epoch: u64, grace_period: Duration) -> JoinHandle<()> {
        let core = Arc::clone(&self.core);
        let lifecycle_tx = Arc::clone(&self.lifecycle_tx);

        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;

            let mut core = core.lock().await;
            let active = core.ledger.active_count();
            match core.shutdown.on_grace_elapsed(epoch, active) {
                Ok(()) => {
                    core.drain_task = None;
                    info!("Grace period elapsed with no apps connected; terminating");
                    lifecycle_tx.send_replace(Lifecycle::Terminated);
                }
                Err(RaceLost::ClientsReturned { active }) => {
                    warn!(
                        "Drain {} abandoned: {} app(s) connected at expiry",
                        epoch, active
                    );
                    lifecycle_tx.send_replace(Lifecycle::Running);
                }
                Err(race) => {
                    debug!("Grace timer for drain {} lost a race: {:?}", epoch, race);
                }
            }
            core.assert_consistent();
        })
    }
}

impl std::fmt::Debug for ControlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlService")
            .field("lifecycle", &self.lifecycle())
            .field("settings", &self.settings)
            .finish()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
