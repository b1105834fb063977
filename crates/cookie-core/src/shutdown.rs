//! Shutdown coordination.
//!
//! Decides, on every disconnect or explicit shutdown request, whether the
//! engine may exit. The coordinator is a plain state machine; the control
//! service owns it under the same lock as the ledger and supplies the
//! current `active_count` to every transition.
//!
//! ```text
//! RUNNING  --evaluate(active == 0)-->  DRAINING(epoch)
//! DRAINING --on_connect(active > 0)--> RUNNING
//! DRAINING --grace elapsed, same epoch, active == 0--> TERMINATED
//! ```
//!
//! Each drain gets a fresh epoch. A grace timer that fires for an epoch that
//! is no longer current has lost a race and changes nothing.

use crate::error::{EngineError, Result};
use crate::models::Lifecycle;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Draining { epoch: u64, deadline: Instant },
    Terminated,
}

/// Outcome of evaluating a disconnect or shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Apps are still connected; the engine stays up.
    StayAlive { active: usize },
    /// A drain started. The caller arms a grace timer for `epoch`.
    BeginDrain { epoch: u64, grace_period: Duration },
    /// A drain was already pending.
    AlreadyDraining { epoch: u64, remaining: Duration },
    /// The engine already terminated.
    AlreadyTerminated,
}

/// Why a grace-period check did not terminate the engine.
///
/// Internal retry signal: logged, never surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceLost {
    /// The drain this timer belonged to was cancelled or replaced.
    Superseded { epoch: u64 },
    /// Apps are connected again; the drain is abandoned.
    ClientsReturned { active: usize },
}

/// Per-process shutdown state machine.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    phase: Phase,
    grace_period: Duration,
    last_epoch: u64,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            phase: Phase::Running,
            grace_period,
            last_epoch: 0,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self.phase {
            Phase::Running => Lifecycle::Running,
            Phase::Draining { .. } => Lifecycle::Draining,
            Phase::Terminated => Lifecycle::Terminated,
        }
    }

    /// Time left in the pending drain.
    pub fn remaining(&self) -> Option<Duration> {
        match self.phase {
            Phase::Draining { deadline, .. } => {
                Some(deadline.saturating_duration_since(Instant::now()))
            }
            _ => None,
        }
    }

    /// Refuse new connections once terminated.
    pub fn ensure_accepting(&self) -> Result<()> {
        match self.phase {
            Phase::Terminated => Err(EngineError::Terminated),
            _ => Ok(()),
        }
    }

    /// Decide after a disconnect or an explicit shutdown request.
    pub fn evaluate(&mut self, active: usize) -> Decision {
        match self.phase {
            Phase::Terminated => Decision::AlreadyTerminated,
            Phase::Draining { epoch, deadline } => Decision::AlreadyDraining {
                epoch,
                remaining: deadline.saturating_duration_since(Instant::now()),
            },
            Phase::Running if active > 0 => Decision::StayAlive { active },
            Phase::Running => {
                self.last_epoch += 1;
                let epoch = self.last_epoch;
                self.phase = Phase::Draining {
                    epoch,
                    deadline: Instant::now() + self.grace_period,
                };
                Decision::BeginDrain {
                    epoch,
                    grace_period: self.grace_period,
                }
            }
        }
    }

    /// Record a successful connect. Returns the epoch of a drain it cancelled.
    pub fn on_connect(&mut self, active: usize) -> Option<u64> {
        match self.phase {
            Phase::Draining { epoch, .. } if active > 0 => {
                self.phase = Phase::Running;
                Some(epoch)
            }
            _ => None,
        }
    }

    /// Re-check when the grace timer for `epoch` fires.
    ///
    /// Terminates only if that drain is still current and nobody is connected.
    pub fn on_grace_elapsed(
        &mut self,
        epoch: u64,
        active: usize,
    ) -> std::result::Result<(), RaceLost> {
        match self.phase {
            Phase::Draining { epoch: current, .. } if current == epoch => {
                if active > 0 {
                    self.phase = Phase::Running;
                    return Err(RaceLost::ClientsReturned { active });
                }
                self.phase = Phase::Terminated;
                Ok(())
            }
            _ => Err(RaceLost::Superseded { epoch }),
        }
    }
}
