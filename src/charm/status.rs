//! Unit status reporting

use serde::{Deserialize, Serialize};
use std::fmt;

use super::reconciler::ReconcileOutcome;

/// Message shown once the workload runs with the desired layer
pub const READY_MESSAGE: &str = "Pod is ready";

/// Message shown while the application lacks cluster permissions
pub const TRUST_MESSAGE: &str = "Run juju trust on this application to continue";

/// Workload status of this unit as displayed to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    Maintenance(String),
    Active(String),
    Blocked(String),
}

impl UnitStatus {
    pub fn maintenance(message: impl Into<String>) -> Self {
        UnitStatus::Maintenance(message.into())
    }

    pub fn active(message: impl Into<String>) -> Self {
        UnitStatus::Active(message.into())
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        UnitStatus::Blocked(message.into())
    }

    /// Status name understood by `status-set`
    pub fn name(&self) -> &'static str {
        match self {
            UnitStatus::Maintenance(_) => "maintenance",
            UnitStatus::Active(_) => "active",
            UnitStatus::Blocked(_) => "blocked",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Maintenance(m) | UnitStatus::Active(m) | UnitStatus::Blocked(m) => m,
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.message())
    }
}

/// Status to publish for a reconciliation outcome; `None` leaves the current one.
pub fn status_for(outcome: &ReconcileOutcome) -> Option<UnitStatus> {
    match outcome {
        ReconcileOutcome::Done { .. } => Some(UnitStatus::active(READY_MESSAGE)),
        ReconcileOutcome::Deferred { .. } => None,
    }
}
