// src/probe/mod.rs

//! Resource probing
//!
//! [`probe`] inspects the host for one desired resource and normalizes what
//! it finds into an [`Observation`]. Probing only ever calls the read side
//! of [`Host`], so it cannot change the machine.
//!
//! Absence is a normal result. Any other failure (permission denied, a
//! broken `systemctl`, a parent path that is not a directory) becomes
//! [`Observation::Unknown`] carrying the error text, which the converger
//! reports as a probe failure.

use crate::hash;
use crate::host::{Host, HostError, PathKind};
use crate::resource::{Attributes, DesiredState, Observation};
use std::path::Path;
use tracing::debug;

/// Observe the current host state of `desired`
pub fn probe<H: Host + ?Sized>(host: &H, desired: &DesiredState) -> Observation {
    let observation = match desired {
        DesiredState::Group(spec) => probe_group(host, &spec.name),
        DesiredState::User(spec) => probe_user(host, &spec.name),
        DesiredState::Directory(spec) => probe_path(host, &spec.path, false),
        DesiredState::Symlink(spec) => probe_path(host, &spec.path, false),
        DesiredState::TemplatedFile(spec) => probe_path(host, &spec.path, true),
        DesiredState::ServiceUnit(spec) => probe_path(host, &spec.file.path, true),
        DesiredState::ArchiveExtraction(spec) => probe_archive(host, &spec.creates),
        DesiredState::ServiceRunning(spec) => probe_service(host, &spec.name),
    }
    .unwrap_or_else(|e| Observation::Unknown {
        diagnostic: e.to_string(),
    });

    debug!("Probed {}: {}", desired.id(), observation.label());
    observation
}

fn probe_group<H: Host + ?Sized>(host: &H, name: &str) -> Result<Observation, HostError> {
    Ok(match host.group(name)? {
        Some(entry) => Observation::Present(Attributes::Group { gid: entry.gid }),
        None => Observation::Absent,
    })
}

fn probe_user<H: Host + ?Sized>(host: &H, name: &str) -> Result<Observation, HostError> {
    Ok(match host.user(name)? {
        Some(entry) => Observation::Present(Attributes::User {
            uid: entry.uid,
            group: entry.group,
            shell: entry.shell,
            home: entry.home,
        }),
        None => Observation::Absent,
    })
}

/// `lstat` the path; regular files get a content hash when `hash_content`
fn probe_path<H: Host + ?Sized>(
    host: &H,
    path: &Path,
    hash_content: bool,
) -> Result<Observation, HostError> {
    let Some(stat) = host.stat(path)? else {
        return Ok(Observation::Absent);
    };

    let content_sha256 = if hash_content && stat.kind == PathKind::File {
        match host.read_file(path) {
            Ok(content) => Some(hash::sha256(&content)),
            // Removed between stat and read
            Err(e) if e.is_not_found() => return Ok(Observation::Absent),
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    Ok(Observation::Present(Attributes::Path {
        stat,
        content_sha256,
    }))
}

/// An extraction is present once its marker exists
fn probe_archive<H: Host + ?Sized>(host: &H, creates: &Path) -> Result<Observation, HostError> {
    Ok(match host.stat(creates)? {
        Some(stat) => Observation::Present(Attributes::Archive {
            owner: stat.owner,
            group: stat.group,
        }),
        None => Observation::Absent,
    })
}

fn probe_service<H: Host + ?Sized>(host: &H, name: &str) -> Result<Observation, HostError> {
    let status = host.service_status(name)?;
    if !status.loaded {
        return Ok(Observation::Absent);
    }
    Ok(Observation::Present(Attributes::Service(status)))
}
