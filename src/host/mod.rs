// src/host/mod.rs

//! Host boundary
//!
//! Every read and every mutation the reconciler performs on the machine
//! goes through the [`Host`] trait. The probe side takes `&self` and must
//! never change anything; the converge side takes `&mut self`.
//!
//! Two implementations ship with the crate:
//! - [`SystemHost`]: the real machine, or a target root directory treated
//!   as `/` (accounts in the target's `/etc/passwd`, paths joined under
//!   the root, services enabled through symlinks)
//! - [`FakeHost`]: an in-memory host used by the test-suites
//!
//! All paths handed to a host are absolute paths as seen from inside the
//! managed system; the host maps them to wherever they really live.

mod accounts;
mod archive;
pub mod fake;
mod files;
mod system;
mod systemd;

pub use fake::FakeHost;
pub use system::SystemHost;
pub use systemd::{install_link_dirs, unit_name};

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::resource::UserSpec;

/// Errors raised at the host boundary
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{command} failed: {detail}")]
    Command { command: String, detail: String },

    #[error("{command} timed out after {}s", .timeout.as_secs())]
    CommandTimeout { command: String, timeout: Duration },

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("refusing to remove directory {}", .0.display())]
    IsDirectory(PathBuf),

    #[error("archive entry escapes destination: {0}")]
    UnsafeArchiveEntry(String),

    #[error("{0}")]
    Unsupported(String),
}

impl HostError {
    pub fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// True when the underlying cause is "does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

/// A group account as found on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
}

/// A user account as found on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    /// Primary group name, or the numeric gid when it has no name
    pub group: String,
    pub home: PathBuf,
    pub shell: String,
}

/// Filesystem object kinds, seen without following a final symlink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl PathKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Other => "other",
        }
    }
}

/// `lstat`-style metadata with owner and group resolved to names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathStat {
    pub kind: PathKind,
    pub owner: String,
    pub group: String,
    /// Permission bits only (`mode & 0o7777`)
    pub mode: u32,
    /// Link target, for symlinks
    pub link_target: Option<PathBuf>,
}

/// What the service manager reports about a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// The service manager knows the unit
    pub loaded: bool,
    pub active: bool,
    pub enabled: bool,
    /// Main process id; `Some(0)` means no process, `None` means not reported
    pub main_pid: Option<u32>,
}

impl ServiceStatus {
    /// Active with a live main process
    pub fn is_running(&self) -> bool {
        self.active && self.main_pid != Some(0)
    }
}

/// Probing and mutation boundary between the reconciler and a machine
pub trait Host {
    // ---------------------------------------------------------------------
    // Probing
    // ---------------------------------------------------------------------

    /// Look up a group by name
    fn group(&self, name: &str) -> HostResult<Option<GroupEntry>>;

    /// Look up a user by name
    fn user(&self, name: &str) -> HostResult<Option<UserEntry>>;

    /// Metadata of `path` without following a final symlink; `None` if absent
    fn stat(&self, path: &Path) -> HostResult<Option<PathStat>>;

    /// Full content of a regular file
    fn read_file(&self, path: &Path) -> HostResult<Vec<u8>>;

    /// Service manager state of a service
    fn service_status(&self, name: &str) -> HostResult<ServiceStatus>;

    // ---------------------------------------------------------------------
    // Accounts
    // ---------------------------------------------------------------------

    fn create_group(&mut self, name: &str, system: bool) -> HostResult<()>;

    fn create_user(&mut self, spec: &UserSpec) -> HostResult<()>;

    /// Bring an existing user's group, shell and home in line with `spec`
    fn modify_user(&mut self, spec: &UserSpec) -> HostResult<()>;

    // ---------------------------------------------------------------------
    // Filesystem
    // ---------------------------------------------------------------------

    fn create_dir(&mut self, path: &Path, mode: u32) -> HostResult<()>;

    /// Atomically replace `path` with `content`
    fn write_file(&mut self, path: &Path, content: &[u8], mode: u32) -> HostResult<()>;

    fn set_owner(&mut self, path: &Path, owner: &str, group: &str) -> HostResult<()>;

    fn set_mode(&mut self, path: &Path, mode: u32) -> HostResult<()>;

    /// Create the symlink `link -> target`
    fn symlink(&mut self, target: &Path, link: &Path) -> HostResult<()>;

    /// Remove a file or symlink; directories are refused
    fn remove(&mut self, path: &Path) -> HostResult<()>;

    /// Remove a directory and everything below it
    fn remove_tree(&mut self, path: &Path) -> HostResult<()>;

    /// Unpack `source` into `dest`, dropping `strip_components` leading
    /// path components from every entry
    fn extract_archive(
        &mut self,
        source: &Path,
        dest: &Path,
        strip_components: usize,
    ) -> HostResult<()>;

    /// Recursively change ownership of `path` and everything below it
    fn chown_tree(&mut self, path: &Path, owner: &str, group: &str) -> HostResult<()>;

    // ---------------------------------------------------------------------
    // Services
    // ---------------------------------------------------------------------

    /// Make the service manager re-read unit files
    fn daemon_reload(&mut self) -> HostResult<()>;

    fn enable_service(&mut self, name: &str) -> HostResult<()>;

    fn start_service(&mut self, name: &str) -> HostResult<()>;

    fn restart_service(&mut self, name: &str) -> HostResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_running_requires_live_pid() {
        let mut status = ServiceStatus {
            loaded: true,
            active: true,
            enabled: true,
            main_pid: Some(0),
        };
        assert!(!status.is_running());

        status.main_pid = Some(4242);
        assert!(status.is_running());

        status.main_pid = None;
        assert!(status.is_running());

        status.active = false;
        assert!(!status.is_running());
    }

    #[test]
    fn test_host_error_not_found() {
        let err = HostError::io(
            "stat",
            Path::new("/nope"),
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("/nope"));

        let denied = HostError::io(
            "stat",
            Path::new("/secret"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(!denied.is_not_found());
    }
}
