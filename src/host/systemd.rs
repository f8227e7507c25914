// src/host/systemd.rs

//! Systemd integration for [`SystemHost`]
//!
//! On the live root everything goes through `systemctl`. In a target root
//! units are enabled by creating the `[Install]` symlinks directly, the
//! daemon reload is skipped, and starting services is not possible.

use super::system::SystemHost;
use super::{HostError, HostResult, ServiceStatus};
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Systemd unit search paths in priority order, relative to the root
const UNIT_SEARCH_PATHS: [&str; 3] = [
    "etc/systemd/system",
    "usr/lib/systemd/system",
    "lib/systemd/system",
];

/// Full unit name for a service (`kafka-consumer` -> `kafka-consumer.service`)
pub fn unit_name(service: &str) -> String {
    if service.contains('.') {
        service.to_string()
    } else {
        format!("{}.service", service)
    }
}

/// Link directories named by a unit's `[Install]` section
///
/// `WantedBy=multi-user.target` yields `multi-user.target.wants` and
/// `RequiredBy=` the matching `.requires` directory. Other keys and other
/// sections are ignored.
pub fn install_link_dirs(unit: &str) -> Vec<String> {
    let mut section = "";
    let mut dirs = Vec::new();
    for line in unit.lines().map(str::trim) {
        if line.starts_with('[') {
            section = line;
            continue;
        }
        if section != "[Install]" {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let suffix = match key.trim() {
            "WantedBy" => "wants",
            "RequiredBy" => "requires",
            _ => continue,
        };
        dirs.extend(
            value
                .split_whitespace()
                .map(|target| format!("{}.{}", target, suffix)),
        );
    }
    dirs
}

/// Parse `systemctl show` output into a status
fn parse_show_output(output: &str) -> ServiceStatus {
    let mut status = ServiceStatus::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "LoadState" => status.loaded = value == "loaded",
            "ActiveState" => status.active = value == "active",
            "UnitFileState" => status.enabled = value == "enabled",
            "MainPID" => status.main_pid = value.parse().ok(),
            _ => {}
        }
    }
    status
}

impl SystemHost {
    /// Root-relative path of the unit file, first match in search order
    fn find_unit_file(&self, unit: &str) -> Option<PathBuf> {
        UNIT_SEARCH_PATHS
            .iter()
            .map(|dir| Path::new(dir).join(unit))
            .find(|rel| self.root.join(rel).exists())
    }

    /// Directories under `etc/systemd/system` that should link to the unit
    fn link_dirs(&self, unit_rel: &Path) -> HostResult<Vec<PathBuf>> {
        let unit_path = self.root.join(unit_rel);
        let content = fs::read_to_string(&unit_path)
            .map_err(|e| HostError::io("read unit file", &unit_path, e))?;
        Ok(install_link_dirs(&content)
            .into_iter()
            .map(|dir| self.root.join("etc/systemd/system").join(dir))
            .collect())
    }

    pub(super) fn query_service_status(&self, name: &str) -> HostResult<ServiceStatus> {
        let unit = unit_name(name);

        if self.is_live_root() {
            let output = self.run_command(
                "systemctl",
                &[
                    "show".to_string(),
                    unit,
                    "--no-pager".to_string(),
                    "--property=LoadState,ActiveState,UnitFileState,MainPID".to_string(),
                ],
            )?;
            return Ok(parse_show_output(&output));
        }

        // Target root: only the enablement symlinks can be observed
        let Some(unit_rel) = self.find_unit_file(&unit) else {
            return Ok(ServiceStatus::default());
        };
        let dirs = self.link_dirs(&unit_rel)?;
        let enabled = !dirs.is_empty()
            && dirs
                .iter()
                .all(|dir| dir.join(&unit).symlink_metadata().is_ok());

        Ok(ServiceStatus {
            loaded: true,
            active: false,
            enabled,
            main_pid: None,
        })
    }

    /// Reload systemd daemon
    ///
    /// When root != "/", this is a no-op since we can't reload the daemon
    /// for a target root. The daemon will reload naturally on first boot.
    pub(super) fn systemd_daemon_reload(&self) -> HostResult<()> {
        if !self.is_live_root() {
            debug!("Skipping daemon-reload for target root");
            return Ok(());
        }
        self.run_command("systemctl", &["daemon-reload".to_string()])?;
        debug!("Reloaded systemd daemon");
        Ok(())
    }

    pub(super) fn systemd_enable(&self, name: &str) -> HostResult<()> {
        let unit = unit_name(name);
        if self.is_live_root() {
            self.run_command("systemctl", &["enable".to_string(), unit.clone()])?;
            info!("Enabled systemd unit '{}'", unit);
            Ok(())
        } else {
            self.systemd_enable_target(&unit)
        }
    }

    /// Run a state-changing `systemctl` verb; only possible on the live root
    pub(super) fn systemctl_live(&self, verb: &str, name: &str) -> HostResult<()> {
        let unit = unit_name(name);
        if !self.is_live_root() {
            return Err(HostError::Unsupported(format!(
                "cannot {} {} inside target root {}",
                verb,
                unit,
                self.root.display()
            )));
        }
        self.run_command("systemctl", &[verb.to_string(), unit.clone()])?;
        info!("Ran systemctl {} {}", verb, unit);
        Ok(())
    }

    /// Enable a unit in a target root by creating its `[Install]` links
    ///
    /// Links point at the unit's absolute path as seen from inside the
    /// target, the way `systemctl --root` lays them out.
    fn systemd_enable_target(&self, unit: &str) -> HostResult<()> {
        let unit_rel = self.find_unit_file(unit).ok_or_else(|| HostError::Command {
            command: format!("enable {}", unit),
            detail: "unit file not found in target root".to_string(),
        })?;

        let dirs = self.link_dirs(&unit_rel)?;
        if dirs.is_empty() {
            debug!("Unit '{}' has no WantedBy/RequiredBy, nothing to enable", unit);
            return Ok(());
        }

        let link_target = Path::new("/").join(&unit_rel);
        for dir in &dirs {
            fs::create_dir_all(dir).map_err(|e| HostError::io("create", dir, e))?;
            let link = dir.join(unit);
            if link.symlink_metadata().is_err() {
                unix_fs::symlink(&link_target, &link)
                    .map_err(|e| HostError::io("create symlink", &link, e))?;
                debug!("Linked {} -> {}", link.display(), link_target.display());
            }
        }

        info!("Enabled systemd unit '{}' in target root", unit);
        Ok(())
    }
}
