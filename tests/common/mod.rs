// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use kafka_converge::config::{ConsumerConfig, parse_config_string};
use kafka_converge::host::FakeHost;
use kafka_converge::runner::RunOptions;
use std::time::Duration;

/// Configuration file with the two properties used throughout the tests
pub const DEMO_CONFIG: &str = r#"
[consumer]
version = "2.12-2.4.1"

[consumer.service_config]
topic = "demo"
bootstrap-server = "localhost:9092"
"#;

pub fn demo_config() -> ConsumerConfig {
    parse_config_string(DEMO_CONFIG).unwrap().consumer
}

/// Fake host with the release archive staged where the config expects it
pub fn staged_host(config: &ConsumerConfig) -> FakeHost {
    let mut host = FakeHost::new();
    let top = format!("kafka_{}", config.version);
    let launcher = format!("{}/bin/kafka-console-consumer.sh", top);
    let jar = format!("{}/libs/kafka-clients-2.4.1.jar", top);
    host.add_archive(
        config.archive_path(),
        &[
            (launcher.as_str(), b"#!/bin/bash\nexec java ...\n".as_slice()),
            (jar.as_str(), b"PK\x03\x04".as_slice()),
        ],
    );
    host.clear_mutations();
    host
}

/// Short service waits so failing verifications do not slow the suite
pub fn fast_options() -> RunOptions {
    RunOptions {
        service_timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(5),
    }
}
