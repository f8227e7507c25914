// src/host/system.rs

//! The real machine as a [`Host`]
//!
//! ## Target Root Support
//!
//! `SystemHost` can manage a directory other than `/` as if it were the
//! root of the system. This is what the integration tests use, and it
//! works for offline provisioning of mounted images too.
//!
//! When root != `/`:
//! - Paths are joined under the root, and symlinks met in parent
//!   components are resolved inside the root rather than on the host
//! - Users and groups are read from the target's `/etc/passwd` and
//!   `/etc/group` and created with `useradd --root` / `groupadd --root`
//! - Units are enabled via symlinks, and services cannot be started
//! - The host system is never modified

use super::{
    GroupEntry, Host, HostError, HostResult, PathStat, ServiceStatus, UserEntry,
};
use crate::resource::UserSpec;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// Default bound on any external command (useradd, systemctl, ...)
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Symlink hops tolerated while resolving a path inside a target root
const MAX_SYMLINK_HOPS: usize = 40;

/// Host implementation backed by the local filesystem and system tools
#[derive(Debug, Clone)]
pub struct SystemHost {
    /// Root filesystem path (usually "/")
    pub(super) root: PathBuf,
    command_timeout: Duration,
}

impl SystemHost {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Bound every external command by `timeout`
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if we're operating on the live root
    pub(super) fn is_live_root(&self) -> bool {
        self.root == Path::new("/")
    }

    /// Map an absolute in-system path to the path to operate on
    ///
    /// The final component is never followed, so callers keep `lstat`
    /// semantics for it.
    pub(super) fn host_path(&self, path: &Path) -> HostResult<PathBuf> {
        if self.is_live_root() {
            return Ok(path.to_path_buf());
        }

        // Pending components, next one last
        let mut pending: Vec<OsString> = Vec::new();
        push_components(&mut pending, path);

        let mut resolved = PathBuf::new();
        let mut hops = 0;

        while let Some(component) = pending.pop() {
            if component == ".." {
                resolved.pop();
                continue;
            }
            resolved.push(&component);

            if pending.is_empty() {
                break;
            }

            let real = self.root.join(&resolved);
            let is_link = fs::symlink_metadata(&real)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if !is_link {
                continue;
            }

            hops += 1;
            if hops > MAX_SYMLINK_HOPS {
                return Err(HostError::io(
                    "resolve",
                    path,
                    io::Error::other("too many levels of symbolic links"),
                ));
            }

            let target = fs::read_link(&real).map_err(|e| HostError::io("read link", &real, e))?;
            resolved.pop();
            if target.is_absolute() {
                resolved = PathBuf::new();
            }
            push_components(&mut pending, &target);
        }

        Ok(self.root.join(resolved))
    }

    /// Run an external command bounded by the command timeout, returning stdout
    pub(super) fn run_command(&self, program: &str, args: &[String]) -> HostResult<String> {
        let rendered = if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        };
        debug!("Running: {}", rendered);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HostError::Command {
                command: rendered.clone(),
                detail: format!("failed to spawn: {}", e),
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let waited = child.wait_timeout(self.command_timeout).map_err(|e| HostError::Command {
            command: rendered.clone(),
            detail: e.to_string(),
        })?;

        let Some(status) = waited else {
            // Timeout - kill the process; the readers finish on their own
            let _ = child.kill();
            let _ = child.wait();
            return Err(HostError::CommandTimeout {
                command: rendered,
                timeout: self.command_timeout,
            });
        };

        let stdout = collect(stdout, &rendered, "stdout")?;
        let stderr = collect(stderr, &rendered, "stderr")?;
        if status.success() {
            Ok(stdout)
        } else {
            Err(HostError::Command {
                command: rendered,
                detail: format!(
                    "exit code {}: {}",
                    status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            })
        }
    }

    /// `--root <dir>` arguments for the shadow utilities in a target root
    pub(super) fn root_args(&self) -> Vec<String> {
        if self.is_live_root() {
            Vec::new()
        } else {
            vec!["--root".to_string(), self.root.display().to_string()]
        }
    }
}

/// Read a child pipe to the end on its own thread
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    })
}

fn collect(
    reader: JoinHandle<io::Result<String>>,
    command: &str,
    stream: &str,
) -> HostResult<String> {
    let read = reader.join().map_err(|_| HostError::Command {
        command: command.to_string(),
        detail: format!("{} reader panicked", stream),
    })?;
    read.map_err(|e| HostError::Command {
        command: command.to_string(),
        detail: format!("failed to read {}: {}", stream, e),
    })
}

/// Push the components of `path` so that the first one is popped first
pub(super) fn push_components(pending: &mut Vec<OsString>, path: &Path) {
    let mut parts: Vec<OsString> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_os_string()),
            Component::ParentDir => parts.push(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    pending.extend(parts.into_iter().rev());
}

impl Host for SystemHost {
    fn group(&self, name: &str) -> HostResult<Option<GroupEntry>> {
        self.lookup_group(name)
    }

    fn user(&self, name: &str) -> HostResult<Option<UserEntry>> {
        self.lookup_user(name)
    }

    fn stat(&self, path: &Path) -> HostResult<Option<PathStat>> {
        self.stat_path(path)
    }

    fn read_file(&self, path: &Path) -> HostResult<Vec<u8>> {
        let real = self.host_path(path)?;
        fs::read(&real).map_err(|e| HostError::io("read", path, e))
    }

    fn service_status(&self, name: &str) -> HostResult<ServiceStatus> {
        self.query_service_status(name)
    }

    fn create_group(&mut self, name: &str, system: bool) -> HostResult<()> {
        self.add_group(name, system)
    }

    fn create_user(&mut self, spec: &UserSpec) -> HostResult<()> {
        self.add_user(spec)
    }

    fn modify_user(&mut self, spec: &UserSpec) -> HostResult<()> {
        self.mod_user(spec)
    }

    fn create_dir(&mut self, path: &Path, mode: u32) -> HostResult<()> {
        self.make_dir(path, mode)
    }

    fn write_file(&mut self, path: &Path, content: &[u8], mode: u32) -> HostResult<()> {
        self.replace_file(path, content, mode)
    }

    fn set_owner(&mut self, path: &Path, owner: &str, group: &str) -> HostResult<()> {
        self.chown_path(path, owner, group)
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> HostResult<()> {
        self.chmod_path(path, mode)
    }

    fn symlink(&mut self, target: &Path, link: &Path) -> HostResult<()> {
        self.make_symlink(target, link)
    }

    fn remove(&mut self, path: &Path) -> HostResult<()> {
        self.remove_entry(path)
    }

    fn remove_tree(&mut self, path: &Path) -> HostResult<()> {
        self.remove_dir_tree(path)
    }

    fn extract_archive(
        &mut self,
        source: &Path,
        dest: &Path,
        strip_components: usize,
    ) -> HostResult<()> {
        self.unpack_archive(source, dest, strip_components)
    }

    fn chown_tree(&mut self, path: &Path, owner: &str, group: &str) -> HostResult<()> {
        self.chown_recursive(path, owner, group)
    }

    fn daemon_reload(&mut self) -> HostResult<()> {
        self.systemd_daemon_reload()
    }

    fn enable_service(&mut self, name: &str) -> HostResult<()> {
        self.systemd_enable(name)
    }

    fn start_service(&mut self, name: &str) -> HostResult<()> {
        self.systemctl_live("start", name)
    }

    fn restart_service(&mut self, name: &str) -> HostResult<()> {
        self.systemctl_live("restart", name)
    }
}
