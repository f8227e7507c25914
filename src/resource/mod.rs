// src/resource/mod.rs

//! Desired-state resource model
//!
//! A [`DesiredState`] describes one host resource completely: the account,
//! path or service it names and every attribute the reconciler is
//! responsible for. Each variant wraps a spec struct so probes, convergers
//! and the order validator can borrow exactly the part they need.
//!
//! Resources are identified by a [`ResourceId`] of the form `kind:name`,
//! for example `group:kafka` or `file:/opt/kafka/config/consumer.properties`.

mod observation;

pub use observation::{Attributes, Observation};

use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

/// Resource kinds, in the order they normally appear in a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Group,
    User,
    Directory,
    Archive,
    Symlink,
    File,
    ServiceUnit,
    Service,
}

impl ResourceKind {
    /// Short name used in resource ids
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::User => "user",
            Self::Directory => "directory",
            Self::Archive => "archive",
            Self::Symlink => "symlink",
            Self::File => "file",
            Self::ServiceUnit => "unit",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of a resource within a plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Identifier for a path-based resource
    pub fn for_path(kind: ResourceKind, path: &Path) -> Self {
        Self::new(kind, path.display().to_string())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A group account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSpec {
    pub name: String,
    pub system: bool,
}

/// A user account with a primary group and login shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSpec {
    pub name: String,
    /// Primary group name
    pub group: String,
    pub shell: String,
    pub home: PathBuf,
    pub system: bool,
}

/// A directory with ownership and permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectorySpec {
    pub path: PathBuf,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

/// A symbolic link `path -> target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymlinkSpec {
    pub path: PathBuf,
    pub target: PathBuf,
}

/// A regular file whose content is fully rendered ahead of time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSpec {
    pub path: PathBuf,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

impl FileSpec {
    pub fn content_sha256(&self) -> String {
        crate::hash::sha256(&self.content)
    }
}

/// An archive unpacked into a destination directory
///
/// The extraction counts as present once `creates` exists; its ownership
/// stands in for the ownership of the whole extracted tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSpec {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub creates: PathBuf,
    pub strip_components: usize,
    pub owner: String,
    pub group: String,
}

/// A service manager unit file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceUnitSpec {
    /// Service name without the `.service` suffix
    pub name: String,
    #[serde(flatten)]
    pub file: FileSpec,
}

/// A service that must be running (and optionally enabled at boot)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    pub name: String,
    pub enable: bool,
    /// Resources whose change in the same run restarts the service
    pub subscribes: Vec<ResourceId>,
}

/// Target state of one host resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DesiredState {
    Group(GroupSpec),
    User(UserSpec),
    Directory(DirectorySpec),
    Symlink(SymlinkSpec),
    TemplatedFile(FileSpec),
    ArchiveExtraction(ArchiveSpec),
    ServiceUnit(ServiceUnitSpec),
    ServiceRunning(ServiceSpec),
}

impl DesiredState {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Group(_) => ResourceKind::Group,
            Self::User(_) => ResourceKind::User,
            Self::Directory(_) => ResourceKind::Directory,
            Self::Symlink(_) => ResourceKind::Symlink,
            Self::TemplatedFile(_) => ResourceKind::File,
            Self::ArchiveExtraction(_) => ResourceKind::Archive,
            Self::ServiceUnit(_) => ResourceKind::ServiceUnit,
            Self::ServiceRunning(_) => ResourceKind::Service,
        }
    }

    pub fn id(&self) -> ResourceId {
        let kind = self.kind();
        match self {
            Self::Group(g) => ResourceId::new(kind, &g.name),
            Self::User(u) => ResourceId::new(kind, &u.name),
            Self::ServiceRunning(s) => ResourceId::new(kind, &s.name),
            Self::Directory(d) => ResourceId::for_path(kind, &d.path),
            Self::Symlink(s) => ResourceId::for_path(kind, &s.path),
            Self::TemplatedFile(f) => ResourceId::for_path(kind, &f.path),
            Self::ArchiveExtraction(a) => ResourceId::for_path(kind, &a.dest),
            Self::ServiceUnit(u) => ResourceId::for_path(kind, &u.file.path),
        }
    }

    /// The filesystem path this resource manages, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Directory(d) => Some(&d.path),
            Self::Symlink(s) => Some(&s.path),
            Self::TemplatedFile(f) => Some(&f.path),
            Self::ArchiveExtraction(a) => Some(&a.dest),
            Self::ServiceUnit(u) => Some(&u.file.path),
            Self::Group(_) | Self::User(_) | Self::ServiceRunning(_) => None,
        }
    }

    /// Owner and group names this resource's paths end up with
    pub fn ownership(&self) -> Option<(&str, &str)> {
        match self {
            Self::Directory(d) => Some((&d.owner, &d.group)),
            Self::TemplatedFile(f) => Some((&f.owner, &f.group)),
            Self::ArchiveExtraction(a) => Some((&a.owner, &a.group)),
            Self::ServiceUnit(u) => Some((&u.file.owner, &u.file.group)),
            Self::Group(_) | Self::User(_) | Self::Symlink(_) | Self::ServiceRunning(_) => None,
        }
    }

    /// True for resources that write file content
    pub fn is_file_like(&self) -> bool {
        matches!(self, Self::TemplatedFile(_) | Self::ServiceUnit(_))
    }

    /// True when a path this resource manages may be a parent of others
    pub fn provides_directory(&self) -> bool {
        matches!(
            self,
            Self::Directory(_) | Self::Symlink(_) | Self::ArchiveExtraction(_)
        )
    }
}

/// Render a permission mode the way `ls` users expect to read it
pub fn format_mode(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(path: &str) -> DesiredState {
        DesiredState::Directory(DirectorySpec {
            path: PathBuf::from(path),
            owner: "kafka".to_string(),
            group: "kafka".to_string(),
            mode: 0o755,
        })
    }

    #[test]
    fn test_resource_id_display() {
        let group = DesiredState::Group(GroupSpec {
            name: "kafka".to_string(),
            system: true,
        });
        assert_eq!(group.id().to_string(), "group:kafka");
        assert_eq!(directory("/var/log/kafka").id().to_string(), "directory:/var/log/kafka");
    }

    #[test]
    fn test_service_unit_id_uses_path() {
        let unit = DesiredState::ServiceUnit(ServiceUnitSpec {
            name: "kafka-consumer".to_string(),
            file: FileSpec {
                path: PathBuf::from("/etc/systemd/system/kafka-consumer.service"),
                content: Vec::new(),
                owner: "root".to_string(),
                group: "root".to_string(),
                mode: 0o644,
            },
        });
        assert_eq!(
            unit.id().to_string(),
            "unit:/etc/systemd/system/kafka-consumer.service"
        );
        assert!(unit.is_file_like());
        assert_eq!(unit.ownership(), Some(("root", "root")));
    }

    #[test]
    fn test_path_and_ownership() {
        let dir = directory("/var/tmp/kafka");
        assert_eq!(dir.path(), Some(Path::new("/var/tmp/kafka")));
        assert_eq!(dir.ownership(), Some(("kafka", "kafka")));
        assert!(dir.provides_directory());

        let link = DesiredState::Symlink(SymlinkSpec {
            path: PathBuf::from("/opt/kafka"),
            target: PathBuf::from("/opt/kafka-2.12-2.4.1"),
        });
        assert!(link.ownership().is_none());
        assert!(link.provides_directory());
    }

    #[test]
    fn test_format_mode() {
        assert_eq!(format_mode(0o755), "0755");
        assert_eq!(format_mode(0o100644), "0644");
    }

    #[test]
    fn test_resource_id_serializes_as_string() {
        let id = ResourceId::new(ResourceKind::Service, "kafka-consumer");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"service:kafka-consumer\"");
    }
}
