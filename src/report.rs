// src/report.rs

//! Human and machine readable rendering of plans and run reports

use crate::converge::{Action, Outcome, ResourceResult};
use crate::runner::{ConvergencePlan, PlanEntry, RunReport};
use std::fmt::Write;

/// Output format for plans and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn action_prefix(action: Option<Action>) -> &'static str {
    match action {
        Some(Action::Create) => "+",
        Some(Action::Update) => "*",
        Some(Action::Recreate) => "!",
        Some(Action::NoOp) => " ",
        None => "?",
    }
}

fn plan_line(out: &mut String, entry: &PlanEntry) {
    let action = entry.decision.as_ref().map(|d| d.action);
    let label = action.map_or("unknown", |a| a.as_str());
    let _ = write!(out, "  {} {:<9} {}", action_prefix(action), label, entry.id);

    match &entry.decision {
        Some(decision) if decision.action.is_change() => {
            let _ = write!(out, " ({})", decision.drift.join(", "));
        }
        Some(_) => {}
        None => {
            if let crate::resource::Observation::Unknown { diagnostic } = &entry.observation {
                let _ = write!(out, " (probe failed: {})", diagnostic);
            }
        }
    }
    out.push('\n');
}

/// Render a dry-run plan for a terminal
pub fn plan_text(plan: &ConvergencePlan) -> String {
    let mut out = String::new();
    let pending = plan.pending_changes();

    if pending == 0 && plan.unobservable().next().is_none() {
        out.push_str("Host is converged - no changes needed\n");
        return out;
    }

    out.push_str("Convergence plan:\n\n");
    for entry in &plan.entries {
        plan_line(&mut out, entry);
    }
    let _ = writeln!(
        out,
        "\n{} to change, {} unchanged, {} unobservable",
        pending,
        plan.entries.len() - pending - plan.unobservable().count(),
        plan.unobservable().count()
    );
    out.push_str("[Dry run - no changes made]\n");
    out
}

fn result_label(result: &ResourceResult) -> String {
    match (&result.outcome, result.action) {
        (Outcome::AlreadyCorrect, _) => "ok".to_string(),
        (Outcome::Converged, Some(action)) => format!("{}d", action.as_str().trim_end_matches('e')),
        (Outcome::Converged, None) => "converged".to_string(),
        (Outcome::Failed { kind, .. }, _) => format!("FAILED ({})", kind.as_str()),
    }
}

/// Render a run report for a terminal
pub fn report_text(report: &RunReport) -> String {
    let mut out = String::new();

    for result in &report.results {
        let _ = write!(out, "  {:<12} {}", result_label(result), result.id);
        match &result.outcome {
            Outcome::Failed { reason, .. } => {
                let _ = write!(out, ": {}", reason);
            }
            Outcome::Converged if !result.drift.is_empty() => {
                let _ = write!(out, " ({})", result.drift.join(", "));
            }
            _ => {}
        }
        out.push('\n');
    }

    if report.aborted {
        out.push_str("\nRun aborted before all resources were handled\n");
    }

    let status = if report.is_success() {
        "converged"
    } else {
        "NOT converged"
    };
    let _ = writeln!(
        out,
        "\n{} resources handled, {} changed in {:.1}s - host {}",
        report.results.len(),
        report.changed_count(),
        (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0,
        status
    );
    if let Some(failure) = report.failure() {
        let _ = writeln!(out, "Failed resource: {}", failure.id);
    }
    out
}

pub fn plan_json(plan: &ConvergencePlan) -> serde_json::Result<String> {
    serde_json::to_string_pretty(plan)
}

pub fn report_json(report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}
