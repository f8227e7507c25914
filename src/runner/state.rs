// src/runner/state.rs

//! Per-resource lifecycle within a run
//!
//! ```text
//! Unprobed -> Absent | Present -> Created | Updated | Recreated | Skipped -> Reported
//! ```
//!
//! A resource whose probe fails goes straight to `Reported`, as does one
//! whose action fails. Nothing ever returns to `Unprobed`.

use crate::converge::{Action, Outcome, ResourceResult};
use crate::resource::{Observation, ResourceId};
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Unprobed,
    Absent,
    Present,
    Created,
    Updated,
    Recreated,
    Skipped,
    Reported,
}

impl ResourceState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unprobed => "unprobed",
            Self::Absent => "absent",
            Self::Present => "present",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Recreated => "recreated",
            Self::Skipped => "skipped",
            Self::Reported => "reported",
        }
    }

    /// Check if a transition is valid
    pub fn can_transition_to(&self, next: ResourceState) -> bool {
        use ResourceState::*;
        matches!(
            (self, next),
            (Unprobed, Absent | Present | Reported)
                | (Absent | Present, Created | Updated | Recreated | Skipped | Reported)
                | (Created | Updated | Recreated | Skipped, Reported)
        )
    }

    fn after_probe(observation: &Observation) -> Option<Self> {
        match observation {
            Observation::Absent => Some(Self::Absent),
            Observation::Present(_) => Some(Self::Present),
            Observation::Unknown { .. } => None,
        }
    }

    fn after_converge(result: &ResourceResult) -> Option<Self> {
        if result.outcome.is_failed() {
            return None;
        }
        match (result.action, &result.outcome) {
            (Some(Action::Create), Outcome::Converged) => Some(Self::Created),
            (Some(Action::Update), Outcome::Converged) => Some(Self::Updated),
            (Some(Action::Recreate), Outcome::Converged) => Some(Self::Recreated),
            _ => Some(Self::Skipped),
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one resource through its lifecycle
#[derive(Debug)]
pub struct Lifecycle {
    id: ResourceId,
    state: ResourceState,
    history: Vec<ResourceState>,
}

impl Lifecycle {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            state: ResourceState::Unprobed,
            history: vec![ResourceState::Unprobed],
        }
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Every state visited, in order
    pub fn history(&self) -> &[ResourceState] {
        &self.history
    }

    pub fn probed(&mut self, observation: &Observation) {
        if let Some(next) = ResourceState::after_probe(observation) {
            self.advance(next);
        }
    }

    pub fn converged(&mut self, result: &ResourceResult) {
        if let Some(next) = ResourceState::after_converge(result) {
            self.advance(next);
        }
    }

    pub fn reported(&mut self) {
        self.advance(ResourceState::Reported);
    }

    fn advance(&mut self, next: ResourceState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "{}: invalid transition {} -> {}",
            self.id,
            self.state,
            next
        );
        debug!("{}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converge::FailureKind;
    use crate::resource::ResourceKind;

    fn result(action: Option<Action>, outcome: Outcome) -> ResourceResult {
        ResourceResult {
            id: ResourceId::new(ResourceKind::Group, "kafka"),
            action,
            outcome,
            drift: Vec::new(),
        }
    }

    #[test]
    fn test_transitions() {
        use ResourceState::*;
        assert!(Unprobed.can_transition_to(Absent));
        assert!(Present.can_transition_to(Skipped));
        assert!(Skipped.can_transition_to(Reported));
        assert!(!Reported.can_transition_to(Unprobed));
        assert!(!Created.can_transition_to(Updated));
        assert!(!Absent.can_transition_to(Unprobed));
    }

    #[test]
    fn test_created_lifecycle() {
        let mut lifecycle = Lifecycle::new(ResourceId::new(ResourceKind::Group, "kafka"));
        lifecycle.probed(&Observation::Absent);
        lifecycle.converged(&result(Some(Action::Create), Outcome::Converged));
        lifecycle.reported();
        assert_eq!(
            lifecycle.history(),
            [
                ResourceState::Unprobed,
                ResourceState::Absent,
                ResourceState::Created,
                ResourceState::Reported
            ]
        );
    }

    #[test]
    fn test_failed_probe_goes_straight_to_reported() {
        let mut lifecycle = Lifecycle::new(ResourceId::new(ResourceKind::Group, "kafka"));
        lifecycle.probed(&Observation::Unknown {
            diagnostic: "permission denied".to_string(),
        });
        lifecycle.converged(&result(
            None,
            Outcome::Failed {
                kind: FailureKind::Probe,
                reason: "permission denied".to_string(),
            },
        ));
        lifecycle.reported();
        assert_eq!(
            lifecycle.history(),
            [ResourceState::Unprobed, ResourceState::Reported]
        );
    }

    #[test]
    fn test_noop_is_skipped() {
        let mut lifecycle = Lifecycle::new(ResourceId::new(ResourceKind::Group, "kafka"));
        lifecycle.probed(&Observation::Absent);
        lifecycle.converged(&result(Some(Action::NoOp), Outcome::AlreadyCorrect));
        assert_eq!(lifecycle.state(), ResourceState::Skipped);
    }
}
