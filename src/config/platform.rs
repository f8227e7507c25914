// src/config/platform.rs

//! Platform detection
//!
//! The only platform-dependent default is the non-interactive login shell:
//! Debian and its derivatives ship `/usr/sbin/nologin`, the RedHat and SUSE
//! families `/sbin/nologin`.

use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Debian,
    RedHat,
    Suse,
    Unknown,
}

impl OsFamily {
    fn from_id(id: &str) -> Option<Self> {
        match id {
            "debian" | "ubuntu" | "raspbian" | "linuxmint" => Some(Self::Debian),
            "rhel" | "fedora" | "centos" | "rocky" | "almalinux" | "ol" | "amzn" => {
                Some(Self::RedHat)
            }
            "suse" | "sles" | "opensuse" | "opensuse-leap" | "opensuse-tumbleweed" => {
                Some(Self::Suse)
            }
            _ => None,
        }
    }

    /// Parse `/etc/os-release` content, trying `ID` before `ID_LIKE`
    pub fn from_os_release(content: &str) -> Self {
        let mut id = None;
        let mut id_like = Vec::new();

        for line in content.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            let value = value.trim_matches(|c| c == '"' || c == '\'');
            match key {
                "ID" => id = Some(value.to_ascii_lowercase()),
                "ID_LIKE" => {
                    id_like = value
                        .split_whitespace()
                        .map(str::to_ascii_lowercase)
                        .collect()
                }
                _ => {}
            }
        }

        id.iter()
            .chain(id_like.iter())
            .find_map(|candidate| Self::from_id(candidate))
            .unwrap_or(Self::Unknown)
    }

    /// Login shell that refuses interactive logins
    pub fn nologin_shell(&self) -> &'static str {
        match self {
            Self::Debian => "/usr/sbin/nologin",
            Self::RedHat | Self::Suse => "/sbin/nologin",
            // Merged /usr makes this path valid nearly everywhere
            Self::Unknown => "/usr/sbin/nologin",
        }
    }
}

/// Detect the OS family of the system at `root`
pub fn detect_os_family(root: &Path) -> OsFamily {
    let candidates = [root.join("etc/os-release"), root.join("usr/lib/os-release")];
    for path in &candidates {
        if let Ok(content) = fs::read_to_string(path) {
            let family = OsFamily::from_os_release(&content);
            debug!("Detected OS family {:?} from {}", family, path.display());
            return family;
        }
    }
    debug!("No os-release found under {}", root.display());
    OsFamily::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_os_release() {
        assert_eq!(
            OsFamily::from_os_release("NAME=\"Ubuntu\"\nID=ubuntu\nID_LIKE=debian\n"),
            OsFamily::Debian
        );
        assert_eq!(
            OsFamily::from_os_release("ID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\n"),
            OsFamily::RedHat
        );
        assert_eq!(
            OsFamily::from_os_release("ID=\"opensuse-leap\"\nID_LIKE=\"suse opensuse\"\n"),
            OsFamily::Suse
        );
        assert_eq!(
            OsFamily::from_os_release("ID=somethingnew\nID_LIKE=\"fedora\"\n"),
            OsFamily::RedHat
        );
        assert_eq!(OsFamily::from_os_release("ID=arch\n"), OsFamily::Unknown);
    }

    #[test]
    fn test_nologin_shell() {
        assert_eq!(OsFamily::Debian.nologin_shell(), "/usr/sbin/nologin");
        assert_eq!(OsFamily::RedHat.nologin_shell(), "/sbin/nologin");
        assert_eq!(OsFamily::Suse.nologin_shell(), "/sbin/nologin");
    }

    #[test]
    fn test_detect_from_target_root() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(detect_os_family(temp_dir.path()), OsFamily::Unknown);

        fs::create_dir_all(temp_dir.path().join("etc")).unwrap();
        fs::write(temp_dir.path().join("etc/os-release"), "ID=debian\n").unwrap();
        assert_eq!(detect_os_family(temp_dir.path()), OsFamily::Debian);
    }
}
