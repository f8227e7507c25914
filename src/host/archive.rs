// src/host/archive.rs

//! Archive extraction for [`SystemHost`]
//!
//! Kafka ships as a gzip-compressed tarball with a single top-level
//! directory (`kafka_2.12-2.4.1/`). Entries are unpacked with a number of
//! leading components stripped, and any entry that would land outside the
//! destination is rejected before anything is written for it. That covers
//! `..` and absolute paths as well as links that lead out of the tree.

use super::system::SystemHost;
use super::{HostError, HostResult};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, info};

/// Compression wrapped around the tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompressionFormat {
    Gzip,
    None,
}

/// Detect compression format from the file name
fn detect_compression(path: &Path) -> CompressionFormat {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if name.ends_with(".tar") {
        CompressionFormat::None
    } else {
        // .tgz and .tar.gz, which is what Kafka mirrors publish
        CompressionFormat::Gzip
    }
}

/// Drop `strip` leading components; `None` when nothing is left
///
/// Fails for entries that are absolute or climb out with `..`.
pub(super) fn strip_entry_path(path: &Path, strip: usize) -> HostResult<Option<PathBuf>> {
    let mut kept = PathBuf::new();
    for (index, component) in path.components().enumerate() {
        match component {
            Component::Normal(part) => {
                if index >= strip {
                    kept.push(part);
                }
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(HostError::UnsafeArchiveEntry(path.display().to_string()));
            }
        }
    }
    Ok(if kept.as_os_str().is_empty() {
        None
    } else {
        Some(kept)
    })
}

fn unsafe_entry(path: &Path) -> HostError {
    HostError::UnsafeArchiveEntry(path.display().to_string())
}

/// Walk `relative` below `root`, creating missing directories
///
/// Existing components are resolved and must stay under `root` as
/// directories. Returns the resolved path of the last component.
fn contained_dir(root: &Path, relative: &Path, entry: &Path) -> HostResult<PathBuf> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        let next = current.join(component);
        match fs::symlink_metadata(&next) {
            Ok(_) => {
                let resolved = next
                    .canonicalize()
                    .map_err(|_| unsafe_entry(entry))?;
                if !resolved.starts_with(root) {
                    return Err(unsafe_entry(entry));
                }
                if !resolved.is_dir() {
                    return Err(HostError::io(
                        "unpack into",
                        &next,
                        io::Error::other("not a directory"),
                    ));
                }
                current = resolved;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir(&next).map_err(|e| HostError::io("create directory", &next, e))?;
                current = next;
            }
            Err(e) => return Err(HostError::io("inspect", &next, e)),
        }
    }
    Ok(current)
}

/// Whether a symlink in `parent` (already resolved, under `root`) pointing
/// at `target` resolves under `root`
fn link_stays_inside(root: &Path, parent: &Path, target: &Path) -> bool {
    let mut depth = parent
        .strip_prefix(root)
        .map(|p| p.components().count())
        .unwrap_or(0);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Unpack every entry of `reader` into `dest`; returns the entry count
///
/// Nothing is written outside `dest`: parents are walked without leaving
/// it, symlinks must point inside it and hard links must name an entry
/// already unpacked inside it.
pub(super) fn unpack<R: Read>(reader: R, dest: &Path, strip: usize) -> HostResult<usize> {
    let root = dest
        .canonicalize()
        .map_err(|e| HostError::io("resolve", dest, e))?;

    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);

    let entries = archive
        .entries()
        .map_err(|e| HostError::io("read archive entries for", dest, e))?;

    let mut count = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| HostError::io("read archive entry for", dest, e))?;
        let entry_path = entry
            .path()
            .map_err(|e| HostError::io("read archive entry path for", dest, e))?
            .into_owned();

        let Some(relative) = strip_entry_path(&entry_path, strip)? else {
            continue;
        };
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            let target = contained_dir(&root, &relative, &entry_path)?;
            entry
                .unpack(&target)
                .map_err(|e| HostError::io("unpack", &target, e))?;
            debug!("Unpacked {}", relative.display());
            count += 1;
            continue;
        }

        let (Some(parent), Some(name)) = (relative.parent(), relative.file_name()) else {
            return Err(unsafe_entry(&entry_path));
        };
        let parent = contained_dir(&root, parent, &entry_path)?;
        let target = parent.join(name);

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let link_name = entry
                .link_name()
                .map_err(|e| HostError::io("read link name for", &target, e))?
                .ok_or_else(|| unsafe_entry(&entry_path))?
                .into_owned();

            if entry_type.is_hard_link() {
                let source = strip_entry_path(&link_name, strip)?
                    .ok_or_else(|| unsafe_entry(&entry_path))?;
                let source = root
                    .join(source)
                    .canonicalize()
                    .map_err(|_| unsafe_entry(&entry_path))?;
                if !source.starts_with(&root) {
                    return Err(unsafe_entry(&entry_path));
                }
                if fs::symlink_metadata(&target).is_ok() {
                    fs::remove_file(&target).map_err(|e| HostError::io("replace", &target, e))?;
                }
                fs::hard_link(&source, &target)
                    .map_err(|e| HostError::io("link", &target, e))?;
                debug!("Linked {}", relative.display());
                count += 1;
                continue;
            }

            if !link_stays_inside(&root, &parent, &link_name) {
                return Err(unsafe_entry(&entry_path));
            }
        }

        entry
            .unpack(&target)
            .map_err(|e| HostError::io("unpack", &target, e))?;
        debug!("Unpacked {}", relative.display());
        count += 1;
    }

    Ok(count)
}

impl SystemHost {
    pub(super) fn unpack_archive(&self, source: &Path, dest: &Path, strip: usize) -> HostResult<()> {
        let real_source = self.host_path(source)?;
        let real_dest = self.host_path(dest)?;

        let file = File::open(&real_source).map_err(|e| HostError::io("open archive", source, e))?;
        let reader: Box<dyn Read> = match detect_compression(&real_source) {
            CompressionFormat::Gzip => Box::new(GzDecoder::new(file)),
            CompressionFormat::None => Box::new(file),
        };

        let count = unpack(reader, &real_dest, strip)?;
        info!(
            "Extracted {} entries from '{}' into '{}'",
            count,
            source.display(),
            dest.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn with_link(entries: &[(&str, &[u8])], links: &[(tar::EntryType, &str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries.iter().take(1) {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        for (kind, path, target) in links {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(*kind);
            header.set_size(0);
            header.set_mode(0o777);
            builder.append_link(&mut header, path, target).unwrap();
        }
        for (path, data) in entries.iter().skip(1) {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_detect_compression() {
        assert_eq!(
            detect_compression(Path::new("/var/tmp/kafka/kafka_2.12-2.4.1.tgz")),
            CompressionFormat::Gzip
        );
        assert_eq!(
            detect_compression(Path::new("/x/kafka.tar.gz")),
            CompressionFormat::Gzip
        );
        assert_eq!(detect_compression(Path::new("/x/kafka.tar")), CompressionFormat::None);
    }

    #[test]
    fn test_strip_entry_path() {
        assert_eq!(
            strip_entry_path(Path::new("kafka_2.12-2.4.1/bin/kafka.sh"), 1).unwrap(),
            Some(PathBuf::from("bin/kafka.sh"))
        );
        assert_eq!(strip_entry_path(Path::new("kafka_2.12-2.4.1/"), 1).unwrap(), None);
        assert_eq!(
            strip_entry_path(Path::new("./a/b"), 0).unwrap(),
            Some(PathBuf::from("a/b"))
        );
        assert!(strip_entry_path(Path::new("top/../../etc/passwd"), 1).is_err());
        assert!(strip_entry_path(Path::new("/etc/passwd"), 0).is_err());
    }

    #[test]
    fn test_unpack_strips_top_directory() {
        let temp_dir = TempDir::new().unwrap();
        let data = tarball(&[
            ("kafka_2.12-2.4.1/bin/kafka-console-consumer.sh", b"#!/bin/sh\n"),
            ("kafka_2.12-2.4.1/config/log4j.properties", b"log4j.rootLogger=INFO\n"),
        ]);

        let count = unpack(&data[..], temp_dir.path(), 1).unwrap();
        assert_eq!(count, 2);
        assert!(temp_dir.path().join("bin/kafka-console-consumer.sh").exists());
        assert_eq!(
            fs::read(temp_dir.path().join("config/log4j.properties")).unwrap(),
            b"log4j.rootLogger=INFO\n"
        );
    }

    #[test]
    fn test_unpack_rejects_writes_through_escaping_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("dest");
        let outside = temp_dir.path().join("outside");
        fs::create_dir(&dest).unwrap();
        fs::create_dir(&outside).unwrap();

        let data = with_link(
            &[("top/README", b"hi"), ("top/evil/pwned", b"owned")],
            &[(tar::EntryType::Symlink, "top/evil", outside.to_str().unwrap())],
        );

        let err = unpack(&data[..], &dest, 1).unwrap_err();
        assert!(matches!(err, HostError::UnsafeArchiveEntry(_)), "{err}");
        assert!(!outside.join("pwned").exists());
        assert!(fs::symlink_metadata(dest.join("evil")).is_err());
    }

    #[test]
    fn test_unpack_rejects_relative_symlink_climbing_out() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("dest");
        fs::create_dir(&dest).unwrap();

        let data = with_link(
            &[("top/README", b"hi")],
            &[(tar::EntryType::Symlink, "top/bin/up", "../../outside")],
        );

        let err = unpack(&data[..], &dest, 1).unwrap_err();
        assert!(matches!(err, HostError::UnsafeArchiveEntry(_)), "{err}");
        assert!(fs::symlink_metadata(dest.join("bin/up")).is_err());
    }

    #[test]
    fn test_unpack_rejects_hard_link_to_outside_file() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("dest");
        fs::create_dir(&dest).unwrap();

        let data = with_link(
            &[("top/README", b"hi")],
            &[(tar::EntryType::Link, "top/passwd", "/etc/passwd")],
        );

        assert!(unpack(&data[..], &dest, 1).is_err());
        assert!(!dest.join("passwd").exists());
    }

    #[test]
    fn test_unpack_keeps_links_inside_destination() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("dest");
        fs::create_dir(&dest).unwrap();

        let data = with_link(
            &[
                ("top/libs/kafka-clients.jar", b"PK"),
                ("top/current/extra.txt", b"x"),
            ],
            &[
                (tar::EntryType::Symlink, "top/current", "libs"),
                (tar::EntryType::Link, "top/clients.jar", "top/libs/kafka-clients.jar"),
            ],
        );

        assert_eq!(unpack(&data[..], &dest, 1).unwrap(), 4);
        assert_eq!(fs::read_link(dest.join("current")).unwrap(), Path::new("libs"));
        assert_eq!(fs::read(dest.join("libs/extra.txt")).unwrap(), b"x");
        assert_eq!(fs::read(dest.join("clients.jar")).unwrap(), b"PK");
    }
}
