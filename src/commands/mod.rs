// src/commands/mod.rs
//! Command handlers for the kafka-converge CLI

mod apply;
mod render;

pub use apply::{cmd_apply, cmd_plan};
pub use render::cmd_render;

use crate::cli::ConfigArgs;
use anyhow::{Context, Result};
use kafka_converge::config::{ConsumerConfig, OsFamily, detect_os_family, load_config};
use std::path::Path;
use tracing::{debug, info};

/// Load the consumer configuration and apply command line overrides
pub fn load_consumer_config(args: &ConfigArgs) -> Result<ConsumerConfig> {
    let file = load_config(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let mut config = file.consumer;

    if let Some(config_dir) = &args.config_dir {
        debug!("Overriding config_dir with {}", config_dir.display());
        config.config_dir = config_dir.clone();
        config
            .validate()
            .context("Invalid --config-dir override")?;
    }

    Ok(config)
}

/// Platform family of the system being converged
pub fn target_os_family(root: &Path) -> OsFamily {
    let family = detect_os_family(root);
    info!("Target root {} detected as {:?}", root.display(), family);
    family
}
