// src/runner/mod.rs

//! Convergence runner
//!
//! The runner takes an ordered list of desired resources, checks that the
//! order respects every dependency, then walks the list one resource at a
//! time: probe, decide, apply, report. It is strictly sequential.
//!
//! Execution rules:
//! - The first failed resource halts the run; nothing after it is probed
//! - The abort flag is checked between resources, never in the middle of one
//! - A service is refreshed when a resource it subscribes to changed
//!   earlier in the same run
//!
//! [`ConvergenceRunner::plan`] is the dry run: it probes and decides but
//! applies nothing.

mod order;
mod state;

pub use order::{PlanError, validate_order};
pub use state::{Lifecycle, ResourceState};

use crate::converge::{
    ConvergeContext, DEFAULT_POLL_INTERVAL, DEFAULT_SERVICE_TIMEOUT, Decision, ResourceResult,
    converge, decide,
};
use crate::host::Host;
use crate::probe::probe;
use crate::resource::{DesiredState, Observation, ResourceId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Tunables for a run
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// How long a started service may take to be running
    pub service_timeout: Duration,
    /// Delay between service status polls
    pub poll_interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            service_timeout: DEFAULT_SERVICE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// One resource of a dry run
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub id: ResourceId,
    pub desired: DesiredState,
    pub observation: Observation,
    /// `None` when the resource could not be observed
    pub decision: Option<Decision>,
}

/// Ordered result of probing every resource without applying anything
#[derive(Debug, Clone, Serialize)]
pub struct ConvergencePlan {
    pub entries: Vec<PlanEntry>,
}

impl ConvergencePlan {
    /// Number of resources that would be changed
    pub fn pending_changes(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.decision.as_ref().is_some_and(|d| d.action.is_change()))
            .count()
    }

    /// Resources whose probe failed
    pub fn unobservable(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.observation.is_unknown())
    }
}

/// Results of a run, in plan order up to the point where it stopped
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The abort flag stopped the run before every resource was handled
    pub aborted: bool,
    pub results: Vec<ResourceResult>,
}

impl RunReport {
    /// Every resource handled and none failed
    pub fn is_success(&self) -> bool {
        !self.aborted && self.failure().is_none()
    }

    /// The failure that halted the run, if any
    pub fn failure(&self) -> Option<&ResourceResult> {
        self.results.iter().find(|r| r.outcome.is_failed())
    }

    /// Number of resources the run changed
    pub fn changed_count(&self) -> usize {
        self.results.iter().filter(|r| r.changed()).count()
    }
}

/// Executes an ordered resource list against a host
pub struct ConvergenceRunner<'a, H: Host + ?Sized> {
    host: &'a mut H,
    options: RunOptions,
    abort: Option<&'a AtomicBool>,
}

impl<'a, H: Host + ?Sized> ConvergenceRunner<'a, H> {
    pub fn new(host: &'a mut H) -> Self {
        Self {
            host,
            options: RunOptions::default(),
            abort: None,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop between resources once `abort` is set
    pub fn with_abort(mut self, abort: &'a AtomicBool) -> Self {
        self.abort = Some(abort);
        self
    }

    fn abort_requested(&self) -> bool {
        self.abort.is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Probe every resource and decide, without applying anything
    pub fn plan(&self, resources: &[DesiredState]) -> Result<ConvergencePlan, PlanError> {
        validate_order(resources)?;

        let mut changing: HashSet<ResourceId> = HashSet::new();
        let mut entries = Vec::with_capacity(resources.len());

        for desired in resources {
            let id = desired.id();
            let observation = probe(&*self.host, desired);
            let decision = decide(desired, &observation, refresh_due(desired, &changing));

            if decision.as_ref().is_some_and(|d| d.action.is_change()) {
                changing.insert(id.clone());
            }
            entries.push(PlanEntry {
                id,
                desired: desired.clone(),
                observation,
                decision,
            });
        }

        Ok(ConvergencePlan { entries })
    }

    /// Converge every resource in order, halting on the first failure
    pub fn run(&mut self, resources: &[DesiredState]) -> Result<RunReport, PlanError> {
        validate_order(resources)?;

        let started_at = Utc::now();
        let mut changed: HashSet<ResourceId> = HashSet::new();
        let mut results = Vec::with_capacity(resources.len());
        let mut aborted = false;

        for desired in resources {
            if self.abort_requested() {
                warn!(
                    "Abort requested, stopping before {} ({} of {} resources handled)",
                    desired.id(),
                    results.len(),
                    resources.len()
                );
                aborted = true;
                break;
            }

            let mut lifecycle = Lifecycle::new(desired.id());
            let observation = probe(&*self.host, desired);
            lifecycle.probed(&observation);

            let ctx = ConvergeContext {
                refresh: refresh_due(desired, &changed),
                service_timeout: self.options.service_timeout,
                poll_interval: self.options.poll_interval,
            };
            let result = converge(&mut *self.host, desired, &observation, &ctx);
            lifecycle.converged(&result);
            lifecycle.reported();

            if result.changed() {
                changed.insert(result.id.clone());
            }
            let failed = result.outcome.is_failed();
            results.push(result);

            if failed {
                warn!("Halting run after failure of {}", desired.id());
                break;
            }
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            aborted,
            results,
        };
        info!(
            "Run finished: {} resources, {} changed, {}",
            report.results.len(),
            report.changed_count(),
            if report.is_success() { "success" } else { "failed" }
        );
        Ok(report)
    }
}

/// A subscribed resource changed earlier in the run
fn refresh_due(desired: &DesiredState, changed: &HashSet<ResourceId>) -> bool {
    match desired {
        DesiredState::ServiceRunning(spec) => spec.subscribes.iter().any(|id| changed.contains(id)),
        _ => false,
    }
}
