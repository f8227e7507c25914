// src/converge/mod.rs

//! Resource convergence
//!
//! Convergence is split in two steps:
//! - [`decide`] compares a desired resource with its observation and picks
//!   the minimal [`Action`], listing every attribute that drifted
//! - [`converge`] applies that action through the host and reports an
//!   [`Outcome`]
//!
//! A converger only ever touches the resource it was handed. Services are
//! verified after a start or restart by polling until they run or the
//! configured wait elapses.

mod apply;
mod decide;
mod error;
mod service;

pub use decide::{Decision, decide};
pub use error::ResourceError;

use crate::host::Host;
use crate::resource::{DesiredState, Observation, ResourceId};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on waiting for a started service to run
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default delay between service status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What convergence does to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Already matches
    NoOp,
    /// Absent, create it
    Create,
    /// Present with drifted attributes, fix them in place
    Update,
    /// Present but unusable as is, remove and create again
    Recreate,
}

impl Action {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoOp => "noop",
            Self::Create => "create",
            Self::Update => "update",
            Self::Recreate => "recreate",
        }
    }

    /// True for every action that mutates the host
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class of a resource failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Probe,
    Converge,
    VerificationTimeout,
}

impl FailureKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Probe => "probe",
            Self::Converge => "converge",
            Self::VerificationTimeout => "verification timeout",
        }
    }
}

/// Final outcome of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Converged,
    AlreadyCorrect,
    Failed { kind: FailureKind, reason: String },
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    fn from_error(error: &ResourceError) -> Self {
        Self::Failed {
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

/// Result of converging one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceResult {
    pub id: ResourceId,
    /// `None` when the probe could not observe the resource
    pub action: Option<Action>,
    pub outcome: Outcome,
    /// Attributes that differed from the desired state
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drift: Vec<String>,
}

impl ResourceResult {
    /// True when the host was changed for this resource
    pub fn changed(&self) -> bool {
        self.outcome == Outcome::Converged && self.action.is_some_and(|a| a.is_change())
    }
}

/// Per-resource inputs beyond the desired state and observation
#[derive(Debug, Clone, Copy)]
pub struct ConvergeContext {
    /// A resource this one subscribes to changed earlier in the run
    pub refresh: bool,
    pub service_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConvergeContext {
    fn default() -> Self {
        Self {
            refresh: false,
            service_timeout: DEFAULT_SERVICE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Bring one resource to its desired state
pub fn converge<H: Host + ?Sized>(
    host: &mut H,
    desired: &DesiredState,
    observed: &Observation,
    ctx: &ConvergeContext,
) -> ResourceResult {
    let id = desired.id();

    let Some(decision) = decide(desired, observed, ctx.refresh) else {
        let error = ResourceError::Probe {
            diagnostic: match observed {
                Observation::Unknown { diagnostic } => diagnostic.clone(),
                _ => "resource could not be observed".to_string(),
            },
        };
        warn!("{}: {}", id, error);
        return ResourceResult {
            id,
            action: None,
            outcome: Outcome::from_error(&error),
            drift: Vec::new(),
        };
    };

    let outcome = if decision.action == Action::NoOp {
        debug!("{} already correct", id);
        Outcome::AlreadyCorrect
    } else {
        match apply::apply(host, desired, observed, decision.action, ctx) {
            Ok(()) => {
                info!("{} {}", decision.action.as_str(), id);
                Outcome::Converged
            }
            Err(e) => {
                warn!("{}: {}", id, e);
                Outcome::from_error(&e)
            }
        }
    };

    ResourceResult {
        id,
        action: Some(decision.action),
        outcome,
        drift: decision.drift,
    }
}
