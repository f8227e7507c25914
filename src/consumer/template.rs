// src/consumer/template.rs

//! Rendering of consumer.properties and the service unit
//!
//! Both renderers are pure functions of the configuration, so the same
//! configuration always produces byte-identical files and re-runs compare
//! equal by content hash.

use crate::config::ConsumerConfig;
use std::collections::BTreeMap;

/// First line of every file this crate writes
pub const MANAGED_HEADER: &str = "# Managed by kafka-converge. Local changes will be overwritten.";

/// Console consumer launcher inside the install root
pub const CONSOLE_CONSUMER: &str = "bin/kafka-console-consumer.sh";

/// Property name for a `service_config` key (`bootstrap-server` -> `bootstrap.server`)
pub fn property_key(key: &str) -> String {
    key.replace('-', ".")
}

/// Render consumer.properties: one `key=value` line per entry, sorted by key
pub fn render_properties(service_config: &BTreeMap<String, String>) -> String {
    let properties: BTreeMap<String, &str> = service_config
        .iter()
        .map(|(key, value)| (property_key(key), value.as_str()))
        .collect();

    let mut out = String::new();
    out.push_str(MANAGED_HEADER);
    out.push('\n');
    for (key, value) in properties {
        out.push_str(&key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Double `%` so systemd does not expand it as a specifier
fn escape_specifiers(value: &str) -> String {
    value.replace('%', "%%")
}

/// Quote a single ExecStart argument when systemd would split it
///
/// `%` and `$` are doubled so the value reaches the process unchanged.
fn exec_arg(value: &str) -> String {
    let value = escape_specifiers(value).replace('$', "$$");
    if !value.is_empty() && !value.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\') {
        return value;
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Render the systemd unit running the console consumer
pub fn render_unit(config: &ConsumerConfig) -> String {
    let launcher = config.link_path().join(CONSOLE_CONSUMER);
    let mut exec_start = format!(
        "{} --consumer.config {}",
        exec_arg(&launcher.display().to_string()),
        exec_arg(&config.properties_path().display().to_string())
    );
    for (key, value) in &config.service_config {
        exec_start.push_str(&format!(" --{} {}", key, exec_arg(value)));
    }

    let mut unit = String::new();
    unit.push_str(MANAGED_HEADER);
    unit.push('\n');

    unit.push_str("[Unit]\n");
    unit.push_str("Description=Apache Kafka console consumer\n");
    unit.push_str("Documentation=https://kafka.apache.org/documentation/\n");
    if !config.service_requires.is_empty() {
        let requires = config.service_requires.join(" ");
        unit.push_str(&format!("Requires={}\n", requires));
        unit.push_str(&format!("After={}\n", requires));
    }
    unit.push('\n');

    unit.push_str("[Service]\n");
    unit.push_str("Type=simple\n");
    unit.push_str(&format!("User={}\n", config.user));
    unit.push_str(&format!("Group={}\n", config.group));
    unit.push_str(&format!(
        "Environment='KAFKA_JMX_OPTS={}'\n",
        escape_specifiers(&config.jmx_opts)
    ));
    unit.push_str(&format!(
        "Environment='KAFKA_LOG4J_OPTS={}'\n",
        escape_specifiers(&config.log4j_opts())
    ));
    unit.push_str(&format!(
        "Environment='LOG_DIR={}'\n",
        escape_specifiers(&config.log_dir.display().to_string())
    ));
    unit.push_str(&format!("ExecStart={}\n", exec_start));
    unit.push_str(&format!("LimitNOFILE={}\n", config.limit_nofile));
    unit.push_str("Restart=on-failure\n");
    unit.push_str(&format!("SyslogIdentifier={}\n", config.service_name));
    unit.push('\n');

    unit.push_str("[Install]\n");
    unit.push_str("WantedBy=multi-user.target\n");
    unit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::install_link_dirs;

    fn demo_config() -> ConsumerConfig {
        let mut config = ConsumerConfig::default();
        config
            .service_config
            .insert("topic".to_string(), "demo".to_string());
        config
            .service_config
            .insert("bootstrap-server".to_string(), "localhost:9092".to_string());
        config
    }

    #[test]
    fn test_property_key() {
        assert_eq!(property_key("bootstrap-server"), "bootstrap.server");
        assert_eq!(property_key("group.id"), "group.id");
    }

    #[test]
    fn test_render_properties() {
        let rendered = render_properties(&demo_config().service_config);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec![MANAGED_HEADER, "bootstrap.server=localhost:9092", "topic=demo"]
        );
        assert!(rendered.ends_with('\n'));
    }

    #[test]
    fn test_render_unit_environment() {
        let unit = render_unit(&demo_config());
        assert!(unit.contains(
            "Environment='KAFKA_JMX_OPTS=-Dcom.sun.management.jmxremote -Dcom.sun.management.jmxremote.authenticate=false -Dcom.sun.management.jmxremote.ssl=false -Dcom.sun.management.jmxremote.port=9993'\n"
        ));
        assert!(unit.contains(
            "Environment='KAFKA_LOG4J_OPTS=-Dlog4j.configuration=file:/opt/kafka/config/log4j.properties'\n"
        ));
    }

    #[test]
    fn test_render_unit_exec_start() {
        let unit = render_unit(&demo_config());
        assert!(unit.contains(
            "ExecStart=/opt/kafka/bin/kafka-console-consumer.sh --consumer.config /opt/kafka/config/consumer.properties --bootstrap-server localhost:9092 --topic demo\n"
        ));
        assert!(unit.contains("User=kafka\nGroup=kafka\n"));
        assert!(unit.contains("Requires=network.target\nAfter=network.target\n"));
        assert!(unit.contains("LimitNOFILE=65536\n"));
        assert_eq!(install_link_dirs(&unit), vec!["multi-user.target.wants"]);
    }

    #[test]
    fn test_exec_arg_quoting() {
        assert_eq!(exec_arg("demo"), "demo");
        assert_eq!(exec_arg("a b"), "\"a b\"");
        assert_eq!(exec_arg("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(exec_arg(""), "\"\"");
    }

    #[test]
    fn test_exec_arg_escapes_specifiers_and_variables() {
        assert_eq!(exec_arg("50%"), "50%%");
        assert_eq!(exec_arg("grp%i"), "grp%%i");
        assert_eq!(exec_arg("pa$$word"), "pa$$$$word");
        assert_eq!(exec_arg("${HOME} 5%"), "\"$${HOME} 5%%\"");
    }

    #[test]
    fn test_render_unit_keeps_literal_values() {
        let mut config = demo_config();
        config
            .service_config
            .insert("group".to_string(), "grp%i".to_string());
        config
            .service_config
            .insert("consumer-property".to_string(), "sasl.password=pa$word".to_string());

        let unit = render_unit(&config);
        assert!(unit.contains(" --group grp%%i"));
        assert!(unit.contains(" --consumer-property sasl.password=pa$$word"));

        let properties = render_properties(&config.service_config);
        assert!(properties.contains("group=grp%i\n"));
        assert!(properties.contains("consumer.property=sasl.password=pa$word\n"));
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(render_unit(&demo_config()), render_unit(&demo_config()));
        assert_eq!(
            render_properties(&demo_config().service_config),
            render_properties(&demo_config().service_config)
        );
    }
}
