// src/config/mod.rs

//! Consumer configuration
//!
//! The desired state of the consumer host is described by a TOML file. The
//! file carries the service properties plus a handful of optional
//! overrides; everything else has a default.
//!
//! # Example consumer.toml
//!
//! ```toml
//! [consumer]
//! version = "2.12-2.4.1"
//! config_dir = "/opt/kafka/config"
//!
//! # Written to consumer.properties ('-' in keys becomes '.')
//! # and passed to the console consumer as flags
//! [consumer.service_config]
//! topic = "demo"
//! bootstrap-server = "localhost:9092"
//! ```

mod parser;
mod platform;

pub use parser::{
    ConfigFile, ConsumerConfig, DEFAULT_JMX_OPTS, DEFAULT_VERSION, parse_config_string,
};
pub use platform::{OsFamily, detect_os_family};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid service_config: {0}")]
    InvalidServiceConfig(String),

    #[error("Invalid path for {field}: {} (must be absolute)", .path.display())]
    RelativePath { field: &'static str, path: PathBuf },

    #[error("Invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Read, parse and validate a configuration file
pub fn load_config(path: &Path) -> ConfigResult<ConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_string(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[consumer.service_config]\ntopic = \"demo\"\nbootstrap-server = \"localhost:9092\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.consumer.service_config.len(), 2);
        assert_eq!(config.consumer.version, DEFAULT_VERSION);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/consumer.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/consumer.toml"));
    }
}
