// src/host/fake.rs

//! In-memory host for tests
//!
//! `FakeHost` models just enough of a Linux machine for the reconciler:
//! a path tree with ownership and modes (symlinks in parent components are
//! followed like the kernel does), user and group tables, staged archives,
//! and a service manager that only knows units present at the last daemon
//! reload.
//!
//! Every mutating call is recorded, and failures can be injected per
//! operation and subject, which is how the idempotence and fail-fast
//! properties are checked without touching a real machine.

use super::archive::strip_entry_path;
use super::system::push_components;
use super::systemd::unit_name;
use super::{
    GroupEntry, Host, HostError, HostResult, PathKind, PathStat, ServiceStatus, UserEntry,
};
use crate::resource::UserSpec;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

const MAX_SYMLINK_HOPS: usize = 40;

/// Directories every fake host starts with
const BASE_DIRECTORIES: [&str; 9] = [
    "/",
    "/etc",
    "/etc/systemd",
    "/etc/systemd/system",
    "/opt",
    "/var",
    "/var/tmp",
    "/var/log",
    "/usr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Directory,
    File(Vec<u8>),
    Symlink(PathBuf),
}

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    owner: String,
    group: String,
    mode: u32,
}

impl Entry {
    fn root_owned(node: Node, mode: u32) -> Self {
        Self {
            node,
            owner: "root".to_string(),
            group: "root".to_string(),
            mode,
        }
    }

    fn kind(&self) -> PathKind {
        match self.node {
            Node::Directory => PathKind::Directory,
            Node::File(_) => PathKind::File,
            Node::Symlink(_) => PathKind::Symlink,
        }
    }
}

#[derive(Debug, Default)]
struct FakeService {
    enabled: bool,
    active: Cell<bool>,
    /// Status polls left before a start takes effect
    pending_polls: Cell<Option<u32>>,
    starts: u32,
    restarts: u32,
}

/// In-memory [`Host`]
#[derive(Debug)]
pub struct FakeHost {
    nodes: BTreeMap<PathBuf, Entry>,
    groups: BTreeMap<String, u32>,
    users: BTreeMap<String, UserEntry>,
    archives: BTreeMap<PathBuf, Vec<(PathBuf, Vec<u8>)>>,
    services: BTreeMap<String, FakeService>,
    loaded_units: BTreeSet<String>,
    unit_dir: PathBuf,
    next_id: u32,
    start_delay: u32,
    crashing: BTreeSet<String>,
    denied: BTreeSet<PathBuf>,
    failing: BTreeSet<String>,
    mutations: Vec<String>,
    probes: RefCell<Vec<String>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    /// A host with a minimal directory skeleton and a root account
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        for dir in BASE_DIRECTORIES {
            nodes.insert(PathBuf::from(dir), Entry::root_owned(Node::Directory, 0o755));
        }

        let mut groups = BTreeMap::new();
        groups.insert("root".to_string(), 0);

        let mut users = BTreeMap::new();
        users.insert(
            "root".to_string(),
            UserEntry {
                name: "root".to_string(),
                uid: 0,
                gid: 0,
                group: "root".to_string(),
                home: PathBuf::from("/root"),
                shell: "/bin/bash".to_string(),
            },
        );

        Self {
            nodes,
            groups,
            users,
            archives: BTreeMap::new(),
            services: BTreeMap::new(),
            loaded_units: BTreeSet::new(),
            unit_dir: PathBuf::from("/etc/systemd/system"),
            next_id: 990,
            start_delay: 0,
            crashing: BTreeSet::new(),
            denied: BTreeSet::new(),
            failing: BTreeSet::new(),
            mutations: Vec::new(),
            probes: RefCell::new(Vec::new()),
        }
    }

    // =========================================================================
    // Test setup
    // =========================================================================

    /// Stage an archive at `path` whose entries unpack to the given files
    ///
    /// Missing parent directories are created root-owned, like a download
    /// into a fresh cache directory would.
    pub fn add_archive(&mut self, path: impl AsRef<Path>, entries: &[(&str, &[u8])]) {
        let path = path.as_ref().to_path_buf();
        self.ensure_dirs(path.parent().unwrap_or(Path::new("/")));
        self.nodes.insert(
            path.clone(),
            Entry::root_owned(Node::File(b"fake archive".to_vec()), 0o644),
        );
        self.archives.insert(
            path,
            entries
                .iter()
                .map(|(p, data)| (PathBuf::from(p), data.to_vec()))
                .collect(),
        );
    }

    /// Number of status polls before a started service reports active
    pub fn set_start_delay(&mut self, polls: u32) {
        self.start_delay = polls;
    }

    /// Make a service exit right after every start
    pub fn set_crashing(&mut self, service: &str) {
        self.crashing.insert(service.to_string());
    }

    /// Fail the mutating operation `op` on `subject` (a path or name)
    pub fn fail_on(&mut self, op: &str, subject: impl Display) {
        self.failing.insert(format!("{} {}", op, subject));
    }

    /// Deny reads of `path` with a permission error
    pub fn deny(&mut self, path: impl AsRef<Path>) {
        self.denied.insert(path.as_ref().to_path_buf());
    }

    /// Change a file's content behind the reconciler's back
    pub fn write_external(&mut self, path: impl AsRef<Path>, content: &[u8]) {
        if let Ok(real) = self.resolve(path.as_ref(), true)
            && let Some(entry) = self.nodes.get_mut(&real)
        {
            entry.node = Node::File(content.to_vec());
        }
    }

    /// Change a path's mode behind the reconciler's back
    pub fn chmod_external(&mut self, path: impl AsRef<Path>, mode: u32) {
        if let Ok(real) = self.resolve(path.as_ref(), true)
            && let Some(entry) = self.nodes.get_mut(&real)
        {
            entry.mode = mode;
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Every mutating call made so far, as `op subject`
    pub fn mutations(&self) -> &[String] {
        &self.mutations
    }

    pub fn clear_mutations(&mut self) {
        self.mutations.clear();
    }

    /// Every probing call made so far, as `op subject`
    pub fn probes(&self) -> Vec<String> {
        self.probes.borrow().clone()
    }

    pub fn clear_probes(&mut self) {
        self.probes.borrow_mut().clear();
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path.as_ref(), false)
            .map(|p| self.nodes.contains_key(&p))
            .unwrap_or(false)
    }

    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        self.entry(path.as_ref(), true)
            .is_some_and(|e| e.node == Node::Directory)
    }

    /// Content of a regular file, following symlinks
    pub fn file_content(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match &self.entry(path.as_ref(), true)?.node {
            Node::File(content) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn link_target(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        match &self.entry(path.as_ref(), false)?.node {
            Node::Symlink(target) => Some(target.clone()),
            _ => None,
        }
    }

    /// Owner and group of a path, following symlinks
    pub fn ownership(&self, path: impl AsRef<Path>) -> Option<(String, String)> {
        self.entry(path.as_ref(), true)
            .map(|e| (e.owner.clone(), e.group.clone()))
    }

    pub fn mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.entry(path.as_ref(), true).map(|e| e.mode)
    }

    pub fn group_entry(&self, name: &str) -> Option<GroupEntry> {
        self.groups.get(name).map(|gid| GroupEntry {
            name: name.to_string(),
            gid: *gid,
        })
    }

    pub fn user_entry(&self, name: &str) -> Option<UserEntry> {
        self.users.get(name).cloned()
    }

    /// Service status without consuming start polls
    pub fn peek_service(&self, name: &str) -> ServiceStatus {
        let loaded = self.loaded_units.contains(&unit_name(name));
        match self.services.get(name) {
            Some(svc) => ServiceStatus {
                loaded,
                active: svc.active.get(),
                enabled: svc.enabled,
                main_pid: Some(if svc.active.get() { 4242 } else { 0 }),
            },
            None => ServiceStatus {
                loaded,
                main_pid: Some(0),
                ..ServiceStatus::default()
            },
        }
    }

    pub fn starts(&self, name: &str) -> u32 {
        self.services.get(name).map_or(0, |s| s.starts)
    }

    pub fn restarts(&self, name: &str) -> u32 {
        self.services.get(name).map_or(0, |s| s.restarts)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn entry(&self, path: &Path, follow_last: bool) -> Option<&Entry> {
        let real = self.resolve(path, follow_last).ok()?;
        self.nodes.get(&real)
    }

    fn resolve(&self, path: &Path, follow_last: bool) -> HostResult<PathBuf> {
        let mut pending: Vec<OsString> = Vec::new();
        push_components(&mut pending, path);

        let mut resolved = PathBuf::from("/");
        let mut hops = 0;

        while let Some(component) = pending.pop() {
            if component == ".." {
                resolved.pop();
                continue;
            }
            resolved.push(&component);

            if pending.is_empty() && !follow_last {
                break;
            }

            if let Some(Entry {
                node: Node::Symlink(target),
                ..
            }) = self.nodes.get(&resolved)
            {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(HostError::io(
                        "resolve",
                        path,
                        io::Error::other("too many levels of symbolic links"),
                    ));
                }
                let target = target.clone();
                resolved.pop();
                if target.is_absolute() {
                    resolved = PathBuf::from("/");
                }
                push_components(&mut pending, &target);
            }
        }

        Ok(resolved)
    }

    fn ensure_dirs(&mut self, path: &Path) {
        let mut current = PathBuf::from("/");
        for component in path.components().skip(1) {
            current.push(component);
            self.nodes
                .entry(current.clone())
                .or_insert_with(|| Entry::root_owned(Node::Directory, 0o755));
        }
    }

    fn observe(&self, op: &str, subject: impl Display) {
        self.probes.borrow_mut().push(format!("{} {}", op, subject));
    }

    fn check_denied(&self, op: &'static str, path: &Path) -> HostResult<()> {
        if self.denied.contains(path) {
            return Err(HostError::io(
                op,
                path,
                io::Error::from(io::ErrorKind::PermissionDenied),
            ));
        }
        Ok(())
    }

    fn record(&mut self, op: &str, subject: impl Display) -> HostResult<()> {
        let key = format!("{} {}", op, subject);
        if self.failing.contains(&key) {
            return Err(HostError::Command {
                command: key,
                detail: "injected failure".to_string(),
            });
        }
        self.mutations.push(key);
        Ok(())
    }

    fn require_parent_dir(&self, real: &Path, path: &Path) -> HostResult<()> {
        let parent = real.parent().unwrap_or(Path::new("/"));
        match self.nodes.get(parent) {
            Some(Entry {
                node: Node::Directory,
                ..
            }) => Ok(()),
            _ => Err(not_found("create", path)),
        }
    }

    fn require_account(&self, owner: &str, group: &str) -> HostResult<()> {
        if !self.users.contains_key(owner) {
            return Err(HostError::UnknownUser(owner.to_string()));
        }
        if !self.groups.contains_key(group) {
            return Err(HostError::UnknownGroup(group.to_string()));
        }
        Ok(())
    }

    fn require_loaded(&self, name: &str) -> HostResult<()> {
        let unit = unit_name(name);
        if self.loaded_units.contains(&unit) {
            Ok(())
        } else {
            Err(HostError::Command {
                command: format!("systemctl start {}", unit),
                detail: format!("Unit {} not found.", unit),
            })
        }
    }

    fn begin_start(&mut self, name: &str) {
        let crashing = self.crashing.contains(name);
        let delay = self.start_delay;
        let svc = self.services.entry(name.to_string()).or_default();
        svc.active.set(false);
        if crashing {
            svc.pending_polls.set(None);
        } else if delay == 0 {
            svc.active.set(true);
        } else {
            svc.pending_polls.set(Some(delay));
        }
    }
}

fn not_found(op: &'static str, path: &Path) -> HostError {
    HostError::io(op, path, io::Error::from(io::ErrorKind::NotFound))
}

impl Host for FakeHost {
    fn group(&self, name: &str) -> HostResult<Option<GroupEntry>> {
        self.observe("group", name);
        Ok(self.group_entry(name))
    }

    fn user(&self, name: &str) -> HostResult<Option<UserEntry>> {
        self.observe("user", name);
        Ok(self.user_entry(name))
    }

    fn stat(&self, path: &Path) -> HostResult<Option<PathStat>> {
        self.observe("stat", path.display());
        self.check_denied("stat", path)?;

        let real = self.resolve(path, false)?;
        Ok(self.nodes.get(&real).map(|entry| PathStat {
            kind: entry.kind(),
            owner: entry.owner.clone(),
            group: entry.group.clone(),
            mode: entry.mode,
            link_target: match &entry.node {
                Node::Symlink(target) => Some(target.clone()),
                _ => None,
            },
        }))
    }

    fn read_file(&self, path: &Path) -> HostResult<Vec<u8>> {
        self.observe("read", path.display());
        self.check_denied("read", path)?;

        let real = self.resolve(path, true)?;
        match self.nodes.get(&real) {
            Some(Entry {
                node: Node::File(content),
                ..
            }) => Ok(content.clone()),
            Some(_) => Err(HostError::io("read", path, io::Error::other("not a regular file"))),
            None => Err(not_found("read", path)),
        }
    }

    fn service_status(&self, name: &str) -> HostResult<ServiceStatus> {
        self.observe("service", name);

        if let Some(svc) = self.services.get(name)
            && let Some(left) = svc.pending_polls.get()
        {
            if left <= 1 {
                svc.pending_polls.set(None);
                svc.active.set(true);
            } else {
                svc.pending_polls.set(Some(left - 1));
            }
        }
        Ok(self.peek_service(name))
    }

    fn create_group(&mut self, name: &str, _system: bool) -> HostResult<()> {
        self.record("create_group", name)?;
        if self.groups.contains_key(name) {
            return Err(HostError::Command {
                command: format!("groupadd {}", name),
                detail: format!("group '{}' already exists", name),
            });
        }
        self.next_id += 1;
        self.groups.insert(name.to_string(), self.next_id);
        Ok(())
    }

    fn create_user(&mut self, spec: &UserSpec) -> HostResult<()> {
        self.record("create_user", &spec.name)?;
        let gid = *self
            .groups
            .get(&spec.group)
            .ok_or_else(|| HostError::UnknownGroup(spec.group.clone()))?;
        if self.users.contains_key(&spec.name) {
            return Err(HostError::Command {
                command: format!("useradd {}", spec.name),
                detail: format!("user '{}' already exists", spec.name),
            });
        }
        self.next_id += 1;
        self.users.insert(
            spec.name.clone(),
            UserEntry {
                name: spec.name.clone(),
                uid: self.next_id,
                gid,
                group: spec.group.clone(),
                home: spec.home.clone(),
                shell: spec.shell.clone(),
            },
        );
        Ok(())
    }

    fn modify_user(&mut self, spec: &UserSpec) -> HostResult<()> {
        self.record("modify_user", &spec.name)?;
        let gid = *self
            .groups
            .get(&spec.group)
            .ok_or_else(|| HostError::UnknownGroup(spec.group.clone()))?;
        let user = self
            .users
            .get_mut(&spec.name)
            .ok_or_else(|| HostError::UnknownUser(spec.name.clone()))?;
        user.gid = gid;
        user.group = spec.group.clone();
        user.shell = spec.shell.clone();
        user.home = spec.home.clone();
        Ok(())
    }

    fn create_dir(&mut self, path: &Path, mode: u32) -> HostResult<()> {
        self.record("create_dir", path.display())?;
        let real = self.resolve(path, false)?;
        self.require_parent_dir(&real, path)?;
        if self.nodes.contains_key(&real) {
            return Err(HostError::io(
                "create directory",
                path,
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        }
        self.nodes.insert(real, Entry::root_owned(Node::Directory, mode));
        Ok(())
    }

    fn write_file(&mut self, path: &Path, content: &[u8], mode: u32) -> HostResult<()> {
        self.record("write_file", path.display())?;
        let real = self.resolve(path, false)?;
        self.require_parent_dir(&real, path)?;
        if let Some(Entry {
            node: Node::Directory,
            ..
        }) = self.nodes.get(&real)
        {
            return Err(HostError::io("replace", path, io::Error::other("is a directory")));
        }
        // Rename over the old inode: fresh ownership
        self.nodes
            .insert(real, Entry::root_owned(Node::File(content.to_vec()), mode));
        Ok(())
    }

    fn set_owner(&mut self, path: &Path, owner: &str, group: &str) -> HostResult<()> {
        self.record("set_owner", path.display())?;
        self.require_account(owner, group)?;
        let real = self.resolve(path, false)?;
        let entry = self
            .nodes
            .get_mut(&real)
            .ok_or_else(|| not_found("set ownership on", path))?;
        entry.owner = owner.to_string();
        entry.group = group.to_string();
        Ok(())
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> HostResult<()> {
        self.record("set_mode", path.display())?;
        let real = self.resolve(path, false)?;
        let entry = self
            .nodes
            .get_mut(&real)
            .ok_or_else(|| not_found("set permissions on", path))?;
        entry.mode = mode;
        Ok(())
    }

    fn symlink(&mut self, target: &Path, link: &Path) -> HostResult<()> {
        self.record("symlink", link.display())?;
        let real = self.resolve(link, false)?;
        self.require_parent_dir(&real, link)?;
        if self.nodes.contains_key(&real) {
            return Err(HostError::io(
                "create symlink",
                link,
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        }
        self.nodes.insert(
            real,
            Entry::root_owned(Node::Symlink(target.to_path_buf()), 0o777),
        );
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> HostResult<()> {
        self.record("remove", path.display())?;
        let real = self.resolve(path, false)?;
        match self.nodes.get(&real) {
            None => Err(not_found("remove", path)),
            Some(Entry {
                node: Node::Directory,
                ..
            }) => Err(HostError::IsDirectory(path.to_path_buf())),
            Some(_) => {
                self.nodes.remove(&real);
                Ok(())
            }
        }
    }

    fn remove_tree(&mut self, path: &Path) -> HostResult<()> {
        self.record("remove_tree", path.display())?;
        let real = self.resolve(path, false)?;
        if !self.nodes.contains_key(&real) {
            return Err(not_found("remove", path));
        }
        self.nodes.retain(|p, _| !p.starts_with(&real));
        Ok(())
    }

    fn extract_archive(
        &mut self,
        source: &Path,
        dest: &Path,
        strip_components: usize,
    ) -> HostResult<()> {
        self.record("extract_archive", dest.display())?;
        let real_source = self.resolve(source, true)?;
        let entries = self
            .archives
            .get(&real_source)
            .cloned()
            .ok_or_else(|| not_found("open archive", source))?;

        let real_dest = self.resolve(dest, true)?;
        if !matches!(
            self.nodes.get(&real_dest),
            Some(Entry {
                node: Node::Directory,
                ..
            })
        ) {
            return Err(not_found("unpack into", dest));
        }

        for (entry_path, data) in entries {
            let Some(relative) = strip_entry_path(&entry_path, strip_components)? else {
                continue;
            };
            let target = real_dest.join(relative);
            if let Some(parent) = target.parent() {
                self.ensure_dirs(parent);
            }
            self.nodes
                .insert(target, Entry::root_owned(Node::File(data), 0o755));
        }
        Ok(())
    }

    fn chown_tree(&mut self, path: &Path, owner: &str, group: &str) -> HostResult<()> {
        self.record("chown_tree", path.display())?;
        self.require_account(owner, group)?;
        let real = self.resolve(path, true)?;
        if !self.nodes.contains_key(&real) {
            return Err(not_found("set ownership on", path));
        }
        for (p, entry) in self.nodes.iter_mut() {
            if p.starts_with(&real) {
                entry.owner = owner.to_string();
                entry.group = group.to_string();
            }
        }
        Ok(())
    }

    fn daemon_reload(&mut self) -> HostResult<()> {
        self.record("daemon_reload", "systemd")?;
        let unit_dir = self.unit_dir.clone();
        self.loaded_units = self
            .nodes
            .iter()
            .filter(|(p, e)| p.parent() == Some(unit_dir.as_path()) && matches!(e.node, Node::File(_)))
            .filter_map(|(p, _)| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        Ok(())
    }

    fn enable_service(&mut self, name: &str) -> HostResult<()> {
        self.record("enable_service", name)?;
        self.require_loaded(name)?;
        self.services.entry(name.to_string()).or_default().enabled = true;
        Ok(())
    }

    fn start_service(&mut self, name: &str) -> HostResult<()> {
        self.record("start_service", name)?;
        self.require_loaded(name)?;
        self.begin_start(name);
        if let Some(svc) = self.services.get_mut(name) {
            svc.starts += 1;
        }
        Ok(())
    }

    fn restart_service(&mut self, name: &str) -> HostResult<()> {
        self.record("restart_service", name)?;
        self.require_loaded(name)?;
        self.begin_start(name);
        if let Some(svc) = self.services.get_mut(name) {
            svc.restarts += 1;
        }
        Ok(())
    }
}
