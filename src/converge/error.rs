// src/converge/error.rs

//! Per-resource failure type

use super::{Action, FailureKind};
use crate::host::HostError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a single resource could not be converged
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The probe could not tell whether the resource exists
    #[error("probe failed: {diagnostic}")]
    Probe { diagnostic: String },

    /// A host mutation failed while applying `action`
    #[error("{action} failed: {source}")]
    Converge {
        action: Action,
        #[source]
        source: HostError,
    },

    /// Extraction finished but did not produce its marker
    #[error("extracting {} did not create {}", .source_path.display(), .creates.display())]
    MarkerMissing {
        source_path: PathBuf,
        creates: PathBuf,
    },

    /// The start command succeeded but the service never came up
    #[error("service {service} not running after {}ms", .waited.as_millis())]
    VerificationTimeout { service: String, waited: Duration },
}

impl ResourceError {
    pub fn converge(action: Action, source: HostError) -> Self {
        Self::Converge { action, source }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Probe { .. } => FailureKind::Probe,
            Self::Converge { .. } | Self::MarkerMissing { .. } => FailureKind::Converge,
            Self::VerificationTimeout { .. } => FailureKind::VerificationTimeout,
        }
    }
}
