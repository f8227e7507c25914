// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: consumer configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .required(true)
        .help("Path to the consumer configuration file")
}

/// Common argument: config_dir override
fn config_dir_arg() -> Arg {
    Arg::new("config_dir")
        .long("config-dir")
        .value_name("DIR")
        .help("Directory for consumer.properties, overriding the file's config_dir")
}

fn format_arg() -> Arg {
    Arg::new("format")
        .long("format")
        .value_parser(["text", "json"])
        .default_value("text")
        .help("Output format")
}

fn build_cli() -> Command {
    Command::new("kafka-converge")
        .version(env!("CARGO_PKG_VERSION"))
        .author("kafka-converge Contributors")
        .about("Idempotent host reconciler for a Kafka console consumer service")
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .global(true)
                .default_value("/")
                .help("Root of the system to converge"),
        )
        .subcommand(
            Command::new("apply")
                .about("Converge the host so the consumer service is installed and running")
                .arg(config_arg())
                .arg(config_dir_arg())
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Show what would change without making changes"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECS")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .help("Seconds to wait for the service to be running after a start"),
                )
                .arg(format_arg()),
        )
        .subcommand(
            Command::new("plan")
                .about("Show what apply would change")
                .arg(config_arg())
                .arg(config_dir_arg())
                .arg(format_arg()),
        )
        .subcommand(
            Command::new("render")
                .about("Print the rendered consumer.properties and unit file")
                .arg(config_arg())
                .arg(config_dir_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell to generate completions for"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("kafka-converge.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
