// src/commands/apply.rs

//! Apply and plan commands

use super::{load_consumer_config, target_os_family};
use crate::cli::ConfigArgs;
use anyhow::{Result, bail};
use kafka_converge::consumer::desired_state;
use kafka_converge::host::SystemHost;
use kafka_converge::report::{self, OutputFormat};
use kafka_converge::runner::{ConvergenceRunner, RunOptions};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::info;

/// Converge the host at `root` to the configured consumer service
pub fn cmd_apply(
    root: &Path,
    args: &ConfigArgs,
    dry_run: bool,
    timeout: Option<u64>,
    format: OutputFormat,
    abort: &AtomicBool,
) -> Result<()> {
    if dry_run {
        return cmd_plan(root, args, format);
    }

    let config = load_consumer_config(args)?;
    let resources = desired_state(&config, target_os_family(root));
    let options = RunOptions {
        service_timeout: timeout.map_or_else(|| config.start_timeout(), Duration::from_secs),
        poll_interval: config.poll_interval(),
    };
    info!(
        "Converging {} resources for service {}",
        resources.len(),
        config.service_name
    );

    let mut host = SystemHost::new(root);
    let run = ConvergenceRunner::new(&mut host)
        .with_options(options)
        .with_abort(abort)
        .run(&resources)?;

    match format {
        OutputFormat::Text => print!("{}", report::report_text(&run)),
        OutputFormat::Json => println!("{}", report::report_json(&run)?),
    }

    if let Some(failure) = run.failure() {
        bail!("Host not converged: {} failed", failure.id);
    }
    if run.aborted {
        bail!("Host not converged: run aborted");
    }
    Ok(())
}

/// Show what `apply` would change without changing anything
pub fn cmd_plan(root: &Path, args: &ConfigArgs, format: OutputFormat) -> Result<()> {
    let config = load_consumer_config(args)?;
    let resources = desired_state(&config, target_os_family(root));

    let mut host = SystemHost::new(root);
    let plan = ConvergenceRunner::new(&mut host).plan(&resources)?;

    match format {
        OutputFormat::Text => print!("{}", report::plan_text(&plan)),
        OutputFormat::Json => println!("{}", report::plan_json(&plan)?),
    }
    Ok(())
}
