// src/host/files.rs

//! Filesystem operations for [`SystemHost`]
//!
//! Mode and ownership are always applied explicitly after creation so the
//! process umask never leaks into managed paths.

use super::system::SystemHost;
use super::{HostError, HostResult, PathKind, PathStat};
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{self as unix_fs, MetadataExt, PermissionsExt};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

impl SystemHost {
    pub(super) fn stat_path(&self, path: &Path) -> HostResult<Option<PathStat>> {
        let real = self.host_path(path)?;
        let meta = match fs::symlink_metadata(&real) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HostError::io("stat", path, e)),
        };

        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            PathKind::Symlink
        } else if file_type.is_dir() {
            PathKind::Directory
        } else if file_type.is_file() {
            PathKind::File
        } else {
            PathKind::Other
        };

        let link_target = if kind == PathKind::Symlink {
            Some(fs::read_link(&real).map_err(|e| HostError::io("read link", path, e))?)
        } else {
            None
        };

        Ok(Some(PathStat {
            kind,
            owner: self.user_name(meta.uid())?,
            group: self.group_name(meta.gid())?,
            mode: meta.mode() & 0o7777,
            link_target,
        }))
    }

    pub(super) fn make_dir(&self, path: &Path, mode: u32) -> HostResult<()> {
        let real = self.host_path(path)?;
        fs::create_dir(&real).map_err(|e| HostError::io("create directory", path, e))?;
        fs::set_permissions(&real, fs::Permissions::from_mode(mode))
            .map_err(|e| HostError::io("set permissions on", path, e))?;
        info!("Created directory '{}'", path.display());
        Ok(())
    }

    /// Write to a temporary file beside `path`, then rename over it
    pub(super) fn replace_file(&self, path: &Path, content: &[u8], mode: u32) -> HostResult<()> {
        let real = self.host_path(path)?;
        let parent = real
            .parent()
            .ok_or_else(|| HostError::Unsupported(format!("{} has no parent", path.display())))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| HostError::io("create temporary file in", parent, e))?;
        tmp.write_all(content)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| HostError::io("write", path, e))?;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))
            .map_err(|e| HostError::io("set permissions on", path, e))?;
        tmp.persist(&real)
            .map_err(|e| HostError::io("replace", path, e.error))?;

        info!("Wrote '{}' ({} bytes)", path.display(), content.len());
        Ok(())
    }

    pub(super) fn chown_path(&self, path: &Path, owner: &str, group: &str) -> HostResult<()> {
        let (uid, gid) = self.resolve_ids(owner, group)?;
        let real = self.host_path(path)?;
        unix_fs::lchown(&real, Some(uid), Some(gid))
            .map_err(|e| HostError::io("set ownership on", path, e))?;
        debug!("Set ownership of '{}' to {}:{}", path.display(), owner, group);
        Ok(())
    }

    pub(super) fn chmod_path(&self, path: &Path, mode: u32) -> HostResult<()> {
        let real = self.host_path(path)?;
        fs::set_permissions(&real, fs::Permissions::from_mode(mode))
            .map_err(|e| HostError::io("set permissions on", path, e))?;
        debug!("Set mode of '{}' to {:04o}", path.display(), mode);
        Ok(())
    }

    pub(super) fn make_symlink(&self, target: &Path, link: &Path) -> HostResult<()> {
        let real = self.host_path(link)?;
        unix_fs::symlink(target, &real).map_err(|e| HostError::io("create symlink", link, e))?;
        info!("Created symlink '{}' -> '{}'", link.display(), target.display());
        Ok(())
    }

    pub(super) fn remove_entry(&self, path: &Path) -> HostResult<()> {
        let real = self.host_path(path)?;
        let meta = fs::symlink_metadata(&real).map_err(|e| HostError::io("stat", path, e))?;
        if meta.is_dir() {
            return Err(HostError::IsDirectory(path.to_path_buf()));
        }
        fs::remove_file(&real).map_err(|e| HostError::io("remove", path, e))?;
        info!("Removed '{}'", path.display());
        Ok(())
    }

    pub(super) fn remove_dir_tree(&self, path: &Path) -> HostResult<()> {
        let real = self.host_path(path)?;
        fs::remove_dir_all(&real).map_err(|e| HostError::io("remove", path, e))?;
        info!("Removed directory tree '{}'", path.display());
        Ok(())
    }

    pub(super) fn chown_recursive(&self, path: &Path, owner: &str, group: &str) -> HostResult<()> {
        let (uid, gid) = self.resolve_ids(owner, group)?;
        let real = self.host_path(path)?;

        let mut count = 0usize;
        for entry in WalkDir::new(&real).follow_links(false) {
            let entry = entry.map_err(|e| {
                let at = e.path().map(Path::to_path_buf).unwrap_or_else(|| real.clone());
                HostError::io("walk", &at, io::Error::other(e.to_string()))
            })?;
            unix_fs::lchown(entry.path(), Some(uid), Some(gid))
                .map_err(|e| HostError::io("set ownership on", entry.path(), e))?;
            count += 1;
        }

        info!(
            "Set ownership of {} entries under '{}' to {}:{}",
            count,
            path.display(),
            owner,
            group
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stat_absent_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let host = SystemHost::new(temp_dir.path());
        assert!(host.stat_path(Path::new("/missing")).unwrap().is_none());
    }

    #[test]
    fn test_make_dir_applies_mode_despite_umask() {
        let temp_dir = TempDir::new().unwrap();
        let host = SystemHost::new(temp_dir.path());

        host.make_dir(Path::new("/data"), 0o750).unwrap();
        let stat = host.stat_path(Path::new("/data")).unwrap().unwrap();
        assert_eq!(stat.kind, PathKind::Directory);
        assert_eq!(stat.mode, 0o750);
    }

    #[test]
    fn test_make_dir_requires_parent() {
        let temp_dir = TempDir::new().unwrap();
        let host = SystemHost::new(temp_dir.path());
        let err = host.make_dir(Path::new("/a/b"), 0o755).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_replace_file_is_atomic_and_sets_mode() {
        let temp_dir = TempDir::new().unwrap();
        let host = SystemHost::new(temp_dir.path());

        host.replace_file(Path::new("/app.conf"), b"one\n", 0o640).unwrap();
        host.replace_file(Path::new("/app.conf"), b"two\n", 0o644).unwrap();

        assert_eq!(fs::read(temp_dir.path().join("app.conf")).unwrap(), b"two\n");
        let stat = host.stat_path(Path::new("/app.conf")).unwrap().unwrap();
        assert_eq!(stat.kind, PathKind::File);
        assert_eq!(stat.mode, 0o644);

        // No temporary files left behind
        let leftovers = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_symlink_stat_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let host = SystemHost::new(temp_dir.path());

        host.make_symlink(Path::new("/opt/kafka-1"), Path::new("/kafka")).unwrap();
        let stat = host.stat_path(Path::new("/kafka")).unwrap().unwrap();
        assert_eq!(stat.kind, PathKind::Symlink);
        assert_eq!(stat.link_target.as_deref(), Some(Path::new("/opt/kafka-1")));

        host.remove_entry(Path::new("/kafka")).unwrap();
        assert!(host.stat_path(Path::new("/kafka")).unwrap().is_none());
    }

    #[test]
    fn test_remove_refuses_directories() {
        let temp_dir = TempDir::new().unwrap();
        let host = SystemHost::new(temp_dir.path());
        host.make_dir(Path::new("/keep"), 0o755).unwrap();

        let err = host.remove_entry(Path::new("/keep")).unwrap_err();
        assert!(matches!(err, HostError::IsDirectory(_)));

        host.remove_dir_tree(Path::new("/keep")).unwrap();
        assert!(!temp_dir.path().join("keep").exists());
    }
}
