// src/converge/decide.rs

//! Observation vs desired state decision table

use super::Action;
use crate::hash;
use crate::host::{PathKind, PathStat};
use crate::resource::{
    ArchiveSpec, Attributes, DesiredState, FileSpec, Observation, ServiceSpec, SymlinkSpec,
    UserSpec, format_mode,
};
use serde::Serialize;
use std::path::Path;

/// The chosen action and the attributes that made it necessary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub drift: Vec<String>,
}

impl Decision {
    fn noop() -> Self {
        Self {
            action: Action::NoOp,
            drift: Vec::new(),
        }
    }

    fn create() -> Self {
        Self {
            action: Action::Create,
            drift: vec!["absent".to_string()],
        }
    }

    /// `action` if anything drifted, otherwise a no-op
    fn from_drift(action: Action, drift: Vec<String>) -> Self {
        if drift.is_empty() {
            Self::noop()
        } else {
            Self { action, drift }
        }
    }
}

/// Pick the minimal action for `desired` given what was observed
///
/// `refresh` is set when a resource the service subscribes to changed in
/// the current run. Returns `None` for an [`Observation::Unknown`].
pub fn decide(desired: &DesiredState, observed: &Observation, refresh: bool) -> Option<Decision> {
    let attrs = match observed {
        Observation::Unknown { .. } => return None,
        Observation::Absent => return Some(Decision::create()),
        Observation::Present(attrs) => attrs,
    };

    let decision = match (desired, attrs) {
        (DesiredState::Group(_), Attributes::Group { .. }) => Decision::noop(),
        (DesiredState::User(spec), Attributes::User { group, shell, home, .. }) => {
            Decision::from_drift(Action::Update, user_drift(spec, group, shell, home))
        }
        (DesiredState::Directory(spec), Attributes::Path { stat, .. }) => {
            if stat.kind != PathKind::Directory {
                return Some(wrong_kind(stat, PathKind::Directory));
            }
            Decision::from_drift(
                Action::Update,
                path_drift(stat, &spec.owner, &spec.group, spec.mode),
            )
        }
        (DesiredState::Symlink(spec), Attributes::Path { stat, .. }) => symlink_decision(spec, stat),
        (DesiredState::TemplatedFile(spec), Attributes::Path { stat, content_sha256 }) => {
            file_decision(spec, stat, content_sha256.as_deref())
        }
        (DesiredState::ServiceUnit(spec), Attributes::Path { stat, content_sha256 }) => {
            file_decision(&spec.file, stat, content_sha256.as_deref())
        }
        (DesiredState::ArchiveExtraction(spec), Attributes::Archive { owner, group }) => {
            archive_decision(spec, owner, group)
        }
        (DesiredState::ServiceRunning(spec), Attributes::Service(status)) => {
            let mut drift = Vec::new();
            if !status.is_running() {
                drift.push("not running".to_string());
            }
            if spec.enable && !status.enabled {
                drift.push("not enabled".to_string());
            }
            if refresh && drift.is_empty() {
                drift.push(refresh_reason(spec));
            }
            Decision::from_drift(Action::Update, drift)
        }
        // A probe always returns attributes of its own kind
        _ => Decision {
            action: Action::Recreate,
            drift: vec!["unexpected observation".to_string()],
        },
    };

    Some(decision)
}

fn user_drift(spec: &UserSpec, group: &str, shell: &str, home: &Path) -> Vec<String> {
    let mut drift = Vec::new();
    if group != spec.group {
        drift.push(format!("group {} -> {}", group, spec.group));
    }
    if shell != spec.shell {
        drift.push(format!("shell {} -> {}", shell, spec.shell));
    }
    if home != spec.home {
        drift.push(format!("home {} -> {}", home.display(), spec.home.display()));
    }
    drift
}

fn path_drift(stat: &PathStat, owner: &str, group: &str, mode: u32) -> Vec<String> {
    let mut drift = Vec::new();
    if stat.owner != owner || stat.group != group {
        drift.push(format!(
            "owner {}:{} -> {}:{}",
            stat.owner, stat.group, owner, group
        ));
    }
    if stat.mode != mode {
        drift.push(format!("mode {} -> {}", format_mode(stat.mode), format_mode(mode)));
    }
    drift
}

fn wrong_kind(stat: &PathStat, wanted: PathKind) -> Decision {
    Decision {
        action: Action::Recreate,
        drift: vec![format!("is a {}, wanted {}", stat.kind.as_str(), wanted.as_str())],
    }
}

fn symlink_decision(spec: &SymlinkSpec, stat: &PathStat) -> Decision {
    if stat.kind != PathKind::Symlink {
        return wrong_kind(stat, PathKind::Symlink);
    }
    match &stat.link_target {
        Some(target) if *target == spec.target => Decision::noop(),
        Some(target) => Decision {
            action: Action::Recreate,
            drift: vec![format!(
                "target {} -> {}",
                target.display(),
                spec.target.display()
            )],
        },
        None => Decision {
            action: Action::Recreate,
            drift: vec!["unreadable link target".to_string()],
        },
    }
}

fn file_decision(spec: &FileSpec, stat: &PathStat, content_sha256: Option<&str>) -> Decision {
    if stat.kind != PathKind::File {
        return wrong_kind(stat, PathKind::File);
    }

    let mut drift = Vec::new();
    let wanted = spec.content_sha256();
    match content_sha256 {
        Some(found) if found == wanted => {}
        Some(found) => drift.push(format!(
            "content {} -> {}",
            hash::short(found),
            hash::short(&wanted)
        )),
        None => drift.push("content unknown".to_string()),
    }
    drift.extend(path_drift(stat, &spec.owner, &spec.group, spec.mode));
    Decision::from_drift(Action::Update, drift)
}

fn archive_decision(spec: &ArchiveSpec, owner: &str, group: &str) -> Decision {
    if owner == spec.owner && group == spec.group {
        return Decision::noop();
    }
    Decision {
        action: Action::Recreate,
        drift: vec![format!(
            "owner {}:{} -> {}:{}",
            owner, group, spec.owner, spec.group
        )],
    }
}

fn refresh_reason(spec: &ServiceSpec) -> String {
    let names: Vec<String> = spec.subscribes.iter().map(ToString::to_string).collect();
    format!("restart for changed {}", names.join(", "))
}
