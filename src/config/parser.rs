// src/config/parser.rs

//! Configuration file parsing

use super::{ConfigError, ConfigResult};
use crate::consumer::property_key;
use crate::host::unit_name;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Kafka release installed when none is configured
pub const DEFAULT_VERSION: &str = "2.12-2.4.1";

/// JMX options exported to the consumer process
pub const DEFAULT_JMX_OPTS: &str = "-Dcom.sun.management.jmxremote \
    -Dcom.sun.management.jmxremote.authenticate=false \
    -Dcom.sun.management.jmxremote.ssl=false \
    -Dcom.sun.management.jmxremote.port=9993";

/// Root of a configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub consumer: ConsumerConfig,
}

/// Everything that describes one consumer host
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumerConfig {
    /// Kafka release, `<scala version>-<kafka version>`
    #[serde(default = "default_version")]
    pub version: String,

    /// Directory holding consumer.properties
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Staged release archive; derived from `package_dir` and `version` when unset
    #[serde(default)]
    pub archive: Option<PathBuf>,

    /// Consumer properties
    #[serde(default)]
    pub service_config: BTreeMap<String, String>,

    #[serde(default = "default_account")]
    pub user: String,

    #[serde(default = "default_account")]
    pub group: String,

    /// Login shell of the service user; detected from the platform when unset
    #[serde(default)]
    pub user_shell: Option<String>,

    /// Parent of the versioned install root and the `kafka` link
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    #[serde(default = "default_package_dir")]
    pub package_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_unit_dir")]
    pub unit_dir: PathBuf,

    #[serde(default = "default_jmx_opts")]
    pub jmx_opts: String,

    /// Defaults to the log4j.properties beside consumer.properties
    #[serde(default)]
    pub log4j_opts: Option<String>,

    #[serde(default = "default_limit_nofile")]
    pub limit_nofile: u64,

    #[serde(default = "default_service_requires")]
    pub service_requires: Vec<String>,

    /// Start the service and keep it enabled
    #[serde(default = "default_true")]
    pub service_ensure_running: bool,

    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/opt/kafka/config")
}

fn default_account() -> String {
    "kafka".to_string()
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("/opt")
}

fn default_package_dir() -> PathBuf {
    PathBuf::from("/var/tmp/kafka")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/kafka")
}

fn default_service_name() -> String {
    "kafka-consumer".to_string()
}

fn default_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_jmx_opts() -> String {
    DEFAULT_JMX_OPTS.to_string()
}

fn default_limit_nofile() -> u64 {
    65536
}

fn default_service_requires() -> Vec<String> {
    vec!["network.target".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_start_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            config_dir: default_config_dir(),
            archive: None,
            service_config: BTreeMap::new(),
            user: default_account(),
            group: default_account(),
            user_shell: None,
            install_dir: default_install_dir(),
            package_dir: default_package_dir(),
            log_dir: default_log_dir(),
            service_name: default_service_name(),
            unit_dir: default_unit_dir(),
            jmx_opts: default_jmx_opts(),
            log4j_opts: None,
            limit_nofile: default_limit_nofile(),
            service_requires: default_service_requires(),
            service_ensure_running: true,
            start_timeout_secs: default_start_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ConsumerConfig {
    /// Versioned install root, e.g. `/opt/kafka-2.12-2.4.1`
    pub fn install_root(&self) -> PathBuf {
        self.install_dir.join(format!("kafka-{}", self.version))
    }

    /// Stable link to the install root, e.g. `/opt/kafka`
    pub fn link_path(&self) -> PathBuf {
        self.install_dir.join("kafka")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.archive
            .clone()
            .unwrap_or_else(|| self.package_dir.join(format!("kafka_{}.tgz", self.version)))
    }

    pub fn properties_path(&self) -> PathBuf {
        self.config_dir.join("consumer.properties")
    }

    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(unit_name(&self.service_name))
    }

    pub fn log4j_opts(&self) -> String {
        self.log4j_opts.clone().unwrap_or_else(|| {
            format!(
                "-Dlog4j.configuration=file:{}",
                self.config_dir.join("log4j.properties").display()
            )
        })
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check the configuration for values that cannot be rendered or applied
    pub fn validate(&self) -> ConfigResult<()> {
        if self.service_config.is_empty() {
            return Err(ConfigError::InvalidServiceConfig(
                "at least one property is required".to_string(),
            ));
        }
        for (key, value) in &self.service_config {
            if key.is_empty() {
                return Err(ConfigError::InvalidServiceConfig("empty key".to_string()));
            }
            if let Some(c) = key
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
            {
                return Err(ConfigError::InvalidServiceConfig(format!(
                    "key '{}' contains '{}'",
                    key, c
                )));
            }
            if value.contains(['\n', '\r']) {
                return Err(ConfigError::InvalidServiceConfig(format!(
                    "value of '{}' spans multiple lines",
                    key
                )));
            }
        }

        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for key in self.service_config.keys() {
            if let Some(other) = seen.insert(property_key(key), key) {
                return Err(ConfigError::InvalidServiceConfig(format!(
                    "keys '{}' and '{}' name the same property",
                    other, key
                )));
            }
        }

        check_absolute("config_dir", &self.config_dir)?;
        check_absolute("install_dir", &self.install_dir)?;
        check_absolute("package_dir", &self.package_dir)?;
        check_absolute("log_dir", &self.log_dir)?;
        check_absolute("unit_dir", &self.unit_dir)?;
        if let Some(archive) = &self.archive {
            check_absolute("archive", archive)?;
        }
        if let Some(shell) = &self.user_shell {
            check_absolute("user_shell", Path::new(shell))?;
        }

        check_name("version", &self.version)?;
        check_name("user", &self.user)?;
        check_name("group", &self.group)?;
        check_name("service_name", &self.service_name)?;

        for (field, value) in [("jmx_opts", &self.jmx_opts)]
            .into_iter()
            .chain(self.log4j_opts.as_ref().map(|v| ("log4j_opts", v)))
        {
            if value.contains(['\n', '\r', '\'']) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be a single line without single quotes".to_string(),
                });
            }
        }

        for (field, value) in [
            ("start_timeout_secs", self.start_timeout_secs),
            ("poll_interval_ms", self.poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn check_absolute(field: &'static str, path: &Path) -> ConfigResult<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ConfigError::RelativePath {
            field,
            path: path.to_path_buf(),
        })
    }
}

/// Names end up in paths and command lines: non-empty, no '/' or whitespace
fn check_name(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.is_empty() {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("'{}' must not contain '/' or whitespace", value),
        });
    }
    Ok(())
}

/// Parse and validate configuration from a string
pub fn parse_config_string(content: &str) -> ConfigResult<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    config.consumer.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[consumer.service_config]
topic = "demo"
bootstrap-server = "localhost:9092"
"#;

    #[test]
    fn test_defaults() {
        let config = parse_config_string(MINIMAL).unwrap().consumer;
        assert_eq!(config.version, "2.12-2.4.1");
        assert_eq!(config.config_dir, PathBuf::from("/opt/kafka/config"));
        assert_eq!(config.install_root(), PathBuf::from("/opt/kafka-2.12-2.4.1"));
        assert_eq!(config.link_path(), PathBuf::from("/opt/kafka"));
        assert_eq!(
            config.archive_path(),
            PathBuf::from("/var/tmp/kafka/kafka_2.12-2.4.1.tgz")
        );
        assert_eq!(
            config.properties_path(),
            PathBuf::from("/opt/kafka/config/consumer.properties")
        );
        assert_eq!(
            config.unit_path(),
            PathBuf::from("/etc/systemd/system/kafka-consumer.service")
        );
        assert_eq!(
            config.log4j_opts(),
            "-Dlog4j.configuration=file:/opt/kafka/config/log4j.properties"
        );
        assert_eq!(config.start_timeout(), Duration::from_secs(10));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.limit_nofile, 65536);
        assert!(config.service_ensure_running);
    }

    #[test]
    fn test_default_matches_serde_defaults() {
        let mut config = ConsumerConfig::default();
        config
            .service_config
            .insert("topic".to_string(), "demo".to_string());
        config
            .service_config
            .insert("bootstrap-server".to_string(), "localhost:9092".to_string());
        assert_eq!(parse_config_string(MINIMAL).unwrap().consumer, config);
    }

    #[test]
    fn test_custom_config_dir() {
        let content = format!("[consumer]\nconfig_dir = \"/opt/kafka/custom_config\"\n{}", MINIMAL);
        let config = parse_config_string(&content).unwrap().consumer;
        assert_eq!(
            config.properties_path(),
            PathBuf::from("/opt/kafka/custom_config/consumer.properties")
        );
        assert_eq!(
            config.log4j_opts(),
            "-Dlog4j.configuration=file:/opt/kafka/custom_config/log4j.properties"
        );
    }

    #[test]
    fn test_jmx_default() {
        assert_eq!(
            DEFAULT_JMX_OPTS,
            "-Dcom.sun.management.jmxremote -Dcom.sun.management.jmxremote.authenticate=false -Dcom.sun.management.jmxremote.ssl=false -Dcom.sun.management.jmxremote.port=9993"
        );
    }

    #[test]
    fn test_empty_service_config_rejected() {
        let err = parse_config_string("[consumer]\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServiceConfig(_)));
    }

    #[test]
    fn test_bad_key_rejected() {
        let err = parse_config_string("[consumer.service_config]\n\"to pic\" = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("contains ' '"));
    }

    #[test]
    fn test_multiline_value_rejected() {
        let err =
            parse_config_string("[consumer.service_config]\ntopic = \"a\\nb\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServiceConfig(_)));
    }

    #[test]
    fn test_colliding_keys_rejected() {
        let err = parse_config_string(
            "[consumer.service_config]\nbootstrap-server = \"a:9092\"\n\"bootstrap.server\" = \"b:9092\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("name the same property"));
    }

    #[test]
    fn test_zero_wait_rejected() {
        for field in ["start_timeout_secs", "poll_interval_ms"] {
            let content = format!("[consumer]\n{} = 0\n{}", field, MINIMAL);
            let err = parse_config_string(&content).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { field: f, .. } if f == field),
                "{err}"
            );
        }
    }

    #[test]
    fn test_relative_path_rejected() {
        let content = format!("[consumer]\nlog_dir = \"var/log/kafka\"\n{}", MINIMAL);
        let err = parse_config_string(&content).unwrap_err();
        assert!(matches!(err, ConfigError::RelativePath { field: "log_dir", .. }));
    }

    #[test]
    fn test_bad_version_rejected() {
        let content = format!("[consumer]\nversion = \"../../etc\"\n{}", MINIMAL);
        let err = parse_config_string(&content).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "version", .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let content = format!("[consumer]\nconfigdir = \"/x\"\n{}", MINIMAL);
        assert!(matches!(
            parse_config_string(&content),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_non_string_value_rejected() {
        assert!(parse_config_string("[consumer.service_config]\nmax-messages = 10\n").is_err());
    }
}
