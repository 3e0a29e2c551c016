//! Pebble layer reconciliation
//!
//! One pass walks `Fetching -> Comparing -> (Applying -> Starting ->) Done`. Any
//! supervisor failure on the way ends the pass in `Deferred`, which the caller turns
//! into a redelivery of the triggering event. A pass deferred in `Starting` has
//! already applied its layer, so it is resumed with [`Reconciler::resume_start`]
//! rather than rerun. A pass that finds the plan already in the desired shape
//! performs no writes and no restarts.

use std::fmt;
use tracing::{debug, error, info, warn};

use crate::pebble::{Layer, PebbleError, Supervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Fetching,
    Comparing,
    Applying,
    Starting,
    Done,
    Deferred,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcilePhase::Fetching => "fetching",
            ReconcilePhase::Comparing => "comparing",
            ReconcilePhase::Applying => "applying",
            ReconcilePhase::Starting => "starting",
            ReconcilePhase::Done => "done",
            ReconcilePhase::Deferred => "deferred",
        };
        f.write_str(name)
    }
}

/// Terminal state of a reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Done {
        /// A layer was pushed and the service (re)started
        applied: bool,
        /// The service was running and got stopped before the start
        restarted: bool,
    },
    Deferred {
        /// Phase whose supervisor call failed
        phase: ReconcilePhase,
        reason: String,
    },
}

impl ReconcileOutcome {
    pub fn phase(&self) -> ReconcilePhase {
        match self {
            ReconcileOutcome::Done { .. } => ReconcilePhase::Done,
            ReconcileOutcome::Deferred { .. } => ReconcilePhase::Deferred,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, ReconcileOutcome::Deferred { .. })
    }
}

/// Drives one Pebble service towards a desired layer
pub struct Reconciler<'a, S: Supervisor + ?Sized> {
    supervisor: &'a S,
    label: &'a str,
    service: &'a str,
}

impl<'a, S: Supervisor + ?Sized> Reconciler<'a, S> {
    /// `label` names the layer, `service` the entry to (re)start.
    pub fn new(supervisor: &'a S, label: &'a str, service: &'a str) -> Self {
        Self {
            supervisor,
            label,
            service,
        }
    }

    pub async fn reconcile(&self, desired: &Layer) -> ReconcileOutcome {
        let plan = match self.supervisor.get_plan().await {
            Ok(plan) => plan,
            Err(e) => return self.defer(ReconcilePhase::Fetching, e),
        };
        debug!("Current Pebble plan: {:?}", plan);

        if plan.services_match(desired) {
            info!("Pebble plan already matches layer {}, nothing to do", self.label);
            return ReconcileOutcome::Done {
                applied: false,
                restarted: false,
            };
        }

        if let Err(e) = self.supervisor.add_layer(self.label, desired, true).await {
            return self.defer(ReconcilePhase::Applying, e);
        }
        info!("Added Pebble layer {}", self.label);

        match self.start_service().await {
            Ok(restarted) => ReconcileOutcome::Done {
                applied: true,
                restarted,
            },
            Err(e) => self.defer(ReconcilePhase::Starting, e),
        }
    }

    /// Re-enter the starting phase of an earlier pass whose layer was applied but
    /// whose start failed. The plan is not compared: it already matches.
    pub async fn resume_start(&self) -> ReconcileOutcome {
        info!("Resuming start of {}", self.service);
        match self.start_service().await {
            Ok(restarted) => ReconcileOutcome::Done {
                applied: false,
                restarted,
            },
            Err(e) => self.defer(ReconcilePhase::Starting, e),
        }
    }

    /// Start the service, stopping it first when it is running so the new
    /// environment is picked up. Returns whether a stop was issued.
    async fn start_service(&self) -> Result<bool, PebbleError> {
        let running = match self.supervisor.get_service(self.service).await {
            Ok(info) => info.is_running(),
            Err(PebbleError::ServiceNotFound(_)) => false,
            Err(e) => return Err(e),
        };

        if running {
            info!("Stopping {} to apply the new layer", self.service);
            self.supervisor.stop(self.service).await?;
        }
        self.supervisor.start(self.service).await?;
        info!("Started {}", self.service);

        Ok(running)
    }

    fn defer(&self, phase: ReconcilePhase, err: PebbleError) -> ReconcileOutcome {
        if err.is_transient() {
            warn!("Pebble API not ready while {}, deferring: {}", phase, err);
        } else {
            error!("Pebble call failed while {}, deferring: {}", phase, err);
        }
        ReconcileOutcome::Deferred {
            phase,
            reason: err.to_string(),
        }
    }
}
