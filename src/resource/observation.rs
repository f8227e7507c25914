// src/resource/observation.rs

//! Observed resource state
//!
//! Observations are recomputed on every run and never cached; they live
//! only as long as the plan entry that holds them.

use crate::host::{PathStat, ServiceStatus};
use serde::Serialize;
use std::path::PathBuf;

/// Result of probing one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Observation {
    /// The resource does not exist
    Absent,
    /// The resource exists with these attributes
    Present(Attributes),
    /// The probe hit an I/O error other than absence
    Unknown { diagnostic: String },
}

impl Observation {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Self::Present(attrs) => Some(attrs),
            _ => None,
        }
    }

    /// Short label for reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Present(_) => "present",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Attributes actually found on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attributes {
    Group {
        gid: u32,
    },
    User {
        uid: u32,
        /// Primary group name (numeric when the gid has no name)
        group: String,
        shell: String,
        home: PathBuf,
    },
    Path {
        #[serde(flatten)]
        stat: PathStat,
        /// SHA-256 of the content, for regular files only
        content_sha256: Option<String>,
    },
    Archive {
        owner: String,
        group: String,
    },
    Service(ServiceStatus),
}
