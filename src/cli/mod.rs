// src/cli/mod.rs
//! CLI definitions for kafka-converge
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `apply` - Converge the host to the configured consumer service
//! - `plan` - Show what `apply` would change (same as `apply --dry-run`)
//! - `render` - Print the rendered consumer.properties and unit file
//! - `completions` - Generate shell completions

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use kafka_converge::report::OutputFormat;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kafka-converge")]
#[command(author = "kafka-converge Contributors")]
#[command(version)]
#[command(about = "Idempotent host reconciler for a Kafka console consumer service", long_about = None)]
pub struct Cli {
    /// Root of the system to converge
    #[arg(short, long, global = true, default_value = "/")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the desired state comes from
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the consumer configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Directory for consumer.properties, overriding the file's config_dir
    #[arg(long)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Converge the host so the consumer service is installed and running
    Apply {
        #[command(flatten)]
        config: ConfigArgs,

        /// Show what would change without making changes
        #[arg(long)]
        dry_run: bool,

        /// Seconds to wait for the service to be running after a start
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show what apply would change
    Plan {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the rendered consumer.properties and unit file
    Render {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_args() {
        let cli = Cli::try_parse_from([
            "kafka-converge",
            "--root",
            "/mnt/target",
            "apply",
            "--config",
            "consumer.toml",
            "--config-dir",
            "/opt/kafka/custom_config",
            "--dry-run",
            "--timeout",
            "30",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.root, PathBuf::from("/mnt/target"));
        let Commands::Apply {
            config,
            dry_run,
            timeout,
            format,
        } = cli.command
        else {
            panic!("expected apply");
        };
        assert_eq!(config.config, PathBuf::from("consumer.toml"));
        assert_eq!(
            config.config_dir,
            Some(PathBuf::from("/opt/kafka/custom_config"))
        );
        assert!(dry_run);
        assert_eq!(timeout, Some(30));
        assert_eq!(format, OutputFormat::Json);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Cli::try_parse_from([
            "kafka-converge",
            "apply",
            "--config",
            "consumer.toml",
            "--timeout",
            "0",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_config_is_required() {
        assert!(Cli::try_parse_from(["kafka-converge", "plan"]).is_err());
    }
}
