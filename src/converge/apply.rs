// src/converge/apply.rs

//! Applying a decided action through the host
//!
//! Updates only touch the attributes that drifted. Recreate removes the
//! existing file or symlink first; real directories are never removed this
//! way, the host refuses and the resource fails. Archives are the exception:
//! their extracted tree is removed and unpacked again.

use super::service;
use super::{Action, ConvergeContext, ResourceError};
use crate::host::{Host, HostError, PathStat};
use crate::resource::{
    ArchiveSpec, Attributes, DesiredState, DirectorySpec, FileSpec, Observation, SymlinkSpec,
};
use tracing::debug;

/// Mode for a recreated archive destination that could not be stat'ed
const DEST_MODE: u32 = 0o755;

pub(super) fn apply<H: Host + ?Sized>(
    host: &mut H,
    desired: &DesiredState,
    observed: &Observation,
    action: Action,
    ctx: &ConvergeContext,
) -> Result<(), ResourceError> {
    let fail = |e: HostError| ResourceError::converge(action, e);

    match desired {
        DesiredState::Group(spec) => host.create_group(&spec.name, spec.system).map_err(fail),
        DesiredState::User(spec) => match action {
            Action::Update => host.modify_user(spec).map_err(fail),
            _ => host.create_user(spec).map_err(fail),
        },
        DesiredState::Directory(spec) => {
            apply_directory(host, spec, observed_stat(observed), action).map_err(fail)
        }
        DesiredState::Symlink(spec) => apply_symlink(host, spec, action).map_err(fail),
        DesiredState::TemplatedFile(spec) => {
            apply_file(host, spec, observed, action).map_err(fail)?;
            Ok(())
        }
        DesiredState::ServiceUnit(spec) => {
            let written = apply_file(host, &spec.file, observed, action).map_err(fail)?;
            if written {
                host.daemon_reload().map_err(fail)?;
            }
            Ok(())
        }
        DesiredState::ArchiveExtraction(spec) => apply_archive(host, spec, action),
        DesiredState::ServiceRunning(spec) => {
            service::apply_service(host, spec, observed, action, ctx)
        }
    }
}

fn observed_stat(observed: &Observation) -> Option<&PathStat> {
    match observed.attributes() {
        Some(Attributes::Path { stat, .. }) => Some(stat),
        _ => None,
    }
}

/// Set ownership and mode where `stat` disagrees; everything when unknown
fn fix_attributes<H: Host + ?Sized>(
    host: &mut H,
    path: &std::path::Path,
    stat: Option<&PathStat>,
    owner: &str,
    group: &str,
    mode: u32,
) -> Result<(), HostError> {
    if stat.is_none_or(|s| s.owner != owner || s.group != group) {
        host.set_owner(path, owner, group)?;
    }
    if stat.is_none_or(|s| s.mode != mode) {
        host.set_mode(path, mode)?;
    }
    Ok(())
}

fn apply_directory<H: Host + ?Sized>(
    host: &mut H,
    spec: &DirectorySpec,
    stat: Option<&PathStat>,
    action: Action,
) -> Result<(), HostError> {
    match action {
        Action::Update => fix_attributes(host, &spec.path, stat, &spec.owner, &spec.group, spec.mode),
        _ => {
            if action == Action::Recreate {
                host.remove(&spec.path)?;
            }
            host.create_dir(&spec.path, spec.mode)?;
            host.set_owner(&spec.path, &spec.owner, &spec.group)
        }
    }
}

fn apply_symlink<H: Host + ?Sized>(
    host: &mut H,
    spec: &SymlinkSpec,
    action: Action,
) -> Result<(), HostError> {
    if action == Action::Recreate {
        host.remove(&spec.path)?;
    }
    host.symlink(&spec.target, &spec.path)
}

/// Returns true when the file content was (re)written
fn apply_file<H: Host + ?Sized>(
    host: &mut H,
    spec: &FileSpec,
    observed: &Observation,
    action: Action,
) -> Result<bool, HostError> {
    if action == Action::Update
        && let Some(Attributes::Path {
            stat,
            content_sha256,
        }) = observed.attributes()
        && content_sha256.as_deref() == Some(spec.content_sha256().as_str())
    {
        debug!("Content of '{}' unchanged", spec.path.display());
        fix_attributes(host, &spec.path, Some(stat), &spec.owner, &spec.group, spec.mode)?;
        return Ok(false);
    }

    if action == Action::Recreate {
        host.remove(&spec.path)?;
    }
    host.write_file(&spec.path, &spec.content, spec.mode)?;
    host.set_owner(&spec.path, &spec.owner, &spec.group)?;
    Ok(true)
}

/// Unpack into the destination, then hand the tree to its owner
///
/// Recreate removes the extracted tree first and brings the destination
/// back empty with the mode it had, so no file of the old tree survives.
fn apply_archive<H: Host + ?Sized>(
    host: &mut H,
    spec: &ArchiveSpec,
    action: Action,
) -> Result<(), ResourceError> {
    let fail = |e: HostError| ResourceError::converge(action, e);

    if action == Action::Recreate {
        let mode = host
            .stat(&spec.dest)
            .map_err(fail)?
            .map_or(DEST_MODE, |stat| stat.mode);
        host.remove_tree(&spec.dest).map_err(fail)?;
        host.create_dir(&spec.dest, mode).map_err(fail)?;
    }

    host.extract_archive(&spec.source, &spec.dest, spec.strip_components)
        .map_err(fail)?;
    host.chown_tree(&spec.dest, &spec.owner, &spec.group)
        .map_err(fail)?;

    if host.stat(&spec.creates).map_err(fail)?.is_none() {
        return Err(ResourceError::MarkerMissing {
            source_path: spec.source.clone(),
            creates: spec.creates.clone(),
        });
    }
    Ok(())
}
