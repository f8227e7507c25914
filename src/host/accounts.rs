// src/host/accounts.rs

//! User and group management for [`SystemHost`]
//!
//! On the live root accounts are queried through `nix` (NSS); in a target
//! root the target's `/etc/passwd` and `/etc/group` are parsed directly.
//! Creation and modification always go through the shadow utilities.

use super::system::SystemHost;
use super::{GroupEntry, HostError, HostResult, UserEntry};
use crate::resource::UserSpec;
use nix::unistd::{Gid, Group, Uid, User};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// One parsed `/etc/passwd` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: String,
}

/// Parse `name:x:uid:gid:gecos:home:shell`
pub(super) fn parse_passwd_line(line: &str) -> Option<PasswdEntry> {
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 7 || line.starts_with('#') {
        return None;
    }
    Some(PasswdEntry {
        name: fields[0].to_string(),
        uid: fields[2].parse().ok()?,
        gid: fields[3].parse().ok()?,
        home: PathBuf::from(fields[5]),
        shell: fields[6].to_string(),
    })
}

/// Parse `name:x:gid:members`
pub(super) fn parse_group_line(line: &str) -> Option<GroupEntry> {
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 3 || line.starts_with('#') {
        return None;
    }
    Some(GroupEntry {
        name: fields[0].to_string(),
        gid: fields[2].parse().ok()?,
    })
}

impl SystemHost {
    fn target_db(&self, file: &str) -> HostResult<Vec<String>> {
        let path = self.root.join("etc").join(file);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(HostError::io("read", &path, e)),
        }
    }

    fn target_passwd(&self) -> HostResult<Vec<PasswdEntry>> {
        Ok(self
            .target_db("passwd")?
            .iter()
            .filter_map(|l| parse_passwd_line(l))
            .collect())
    }

    fn target_groups(&self) -> HostResult<Vec<GroupEntry>> {
        Ok(self
            .target_db("group")?
            .iter()
            .filter_map(|l| parse_group_line(l))
            .collect())
    }

    pub(super) fn lookup_group(&self, name: &str) -> HostResult<Option<GroupEntry>> {
        if self.is_live_root() {
            let group = Group::from_name(name)
                .map_err(|e| HostError::io("look up group", Path::new("/etc/group"), io::Error::from(e)))?;
            Ok(group.map(|g| GroupEntry {
                name: g.name,
                gid: g.gid.as_raw(),
            }))
        } else {
            Ok(self.target_groups()?.into_iter().find(|g| g.name == name))
        }
    }

    pub(super) fn lookup_user(&self, name: &str) -> HostResult<Option<UserEntry>> {
        if self.is_live_root() {
            let user = User::from_name(name)
                .map_err(|e| HostError::io("look up user", Path::new("/etc/passwd"), io::Error::from(e)))?;
            let Some(user) = user else {
                return Ok(None);
            };
            let gid = user.gid.as_raw();
            Ok(Some(UserEntry {
                name: user.name,
                uid: user.uid.as_raw(),
                gid,
                group: self.group_name(gid)?,
                home: user.dir,
                shell: user.shell.display().to_string(),
            }))
        } else {
            let Some(entry) = self.target_passwd()?.into_iter().find(|u| u.name == name) else {
                return Ok(None);
            };
            Ok(Some(UserEntry {
                group: self.group_name(entry.gid)?,
                name: entry.name,
                uid: entry.uid,
                gid: entry.gid,
                home: entry.home,
                shell: entry.shell,
            }))
        }
    }

    /// Name for a uid, or the uid itself when it has none
    pub(super) fn user_name(&self, uid: u32) -> HostResult<String> {
        let name = if self.is_live_root() {
            User::from_uid(Uid::from_raw(uid))
                .ok()
                .flatten()
                .map(|u| u.name)
        } else {
            self.target_passwd()?
                .into_iter()
                .find(|u| u.uid == uid)
                .map(|u| u.name)
        };
        Ok(name.unwrap_or_else(|| uid.to_string()))
    }

    /// Name for a gid, or the gid itself when it has none
    pub(super) fn group_name(&self, gid: u32) -> HostResult<String> {
        let name = if self.is_live_root() {
            Group::from_gid(Gid::from_raw(gid))
                .ok()
                .flatten()
                .map(|g| g.name)
        } else {
            self.target_groups()?
                .into_iter()
                .find(|g| g.gid == gid)
                .map(|g| g.name)
        };
        Ok(name.unwrap_or_else(|| gid.to_string()))
    }

    /// Resolve owner and group names to numeric ids
    pub(super) fn resolve_ids(&self, owner: &str, group: &str) -> HostResult<(u32, u32)> {
        let uid = self
            .lookup_user(owner)?
            .map(|u| u.uid)
            .ok_or_else(|| HostError::UnknownUser(owner.to_string()))?;
        let gid = self
            .lookup_group(group)?
            .map(|g| g.gid)
            .ok_or_else(|| HostError::UnknownGroup(group.to_string()))?;
        Ok((uid, gid))
    }

    /// Make sure the target's /etc exists before the shadow tools touch it
    fn ensure_target_etc(&self) -> HostResult<()> {
        if !self.is_live_root() {
            let etc_path = self.root.join("etc");
            fs::create_dir_all(&etc_path).map_err(|e| HostError::io("create", &etc_path, e))?;
        }
        Ok(())
    }

    pub(super) fn add_group(&self, name: &str, system: bool) -> HostResult<()> {
        self.ensure_target_etc()?;

        let mut args = self.root_args();
        if system {
            args.push("--system".to_string());
        }
        args.push(name.to_string());

        self.run_command("groupadd", &args)?;
        info!("Created group '{}' (root: {})", name, self.root.display());
        Ok(())
    }

    pub(super) fn add_user(&self, spec: &UserSpec) -> HostResult<()> {
        self.ensure_target_etc()?;

        let mut args = self.root_args();
        if spec.system {
            args.push("--system".to_string());
        }
        args.extend([
            "--gid".to_string(),
            spec.group.clone(),
            "--shell".to_string(),
            spec.shell.clone(),
            "--home-dir".to_string(),
            spec.home.display().to_string(),
            // The home is a managed path of its own
            "--no-create-home".to_string(),
            spec.name.clone(),
        ]);

        self.run_command("useradd", &args)?;
        info!("Created user '{}' (root: {})", spec.name, self.root.display());
        Ok(())
    }

    pub(super) fn mod_user(&self, spec: &UserSpec) -> HostResult<()> {
        let mut args = self.root_args();
        args.extend([
            "--gid".to_string(),
            spec.group.clone(),
            "--shell".to_string(),
            spec.shell.clone(),
            "--home".to_string(),
            spec.home.display().to_string(),
            spec.name.clone(),
        ]);

        self.run_command("usermod", &args)?;
        info!("Updated user '{}' (root: {})", spec.name, self.root.display());
        Ok(())
    }
}
