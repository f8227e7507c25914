// src/commands/render.rs

use super::load_consumer_config;
use crate::cli::ConfigArgs;
use anyhow::Result;
use kafka_converge::consumer::{render_properties, render_unit};

/// Print the files `apply` would write, each preceded by its path
pub fn cmd_render(args: &ConfigArgs) -> Result<()> {
    let config = load_consumer_config(args)?;

    println!("==> {} <==", config.properties_path().display());
    print!("{}", render_properties(&config.service_config));
    println!();
    println!("==> {} <==", config.unit_path().display());
    print!("{}", render_unit(&config));
    Ok(())
}
