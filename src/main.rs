// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Set by SIGINT/SIGTERM; the runner stops before the next resource
static ABORT: AtomicBool = AtomicBool::new(false);

extern "C" fn request_abort(_signal: nix::libc::c_int) {
    ABORT.store(true, Ordering::SeqCst);
}

fn install_abort_handler() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(request_abort),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic
        unsafe { sigaction(signal, &action)? };
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            config,
            dry_run,
            timeout,
            format,
        } => {
            if let Err(e) = install_abort_handler() {
                warn!("Could not install signal handler, runs cannot be interrupted: {}", e);
            }
            commands::cmd_apply(&cli.root, &config, dry_run, timeout, format, &ABORT)
        }
        Commands::Plan { config, format } => commands::cmd_plan(&cli.root, &config, format),
        Commands::Render { config } => commands::cmd_render(&config),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}
