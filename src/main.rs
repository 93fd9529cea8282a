//! Taptype - hotkey-driven speech-to-text daemon
//!
//! `taptype start` runs the daemon (add `--background` to detach).
//! `taptype stop` and `taptype status` manage a running instance.

use clap::Parser;
use std::process::ExitCode;
use taptype::cli::{Cli, Commands};
use taptype::config::{self, ActivationMode};
use taptype::supervisor;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("taptype={},warn", log_level))),
        )
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> taptype::error::Result<()> {
    let mut config = config::load_config(cli.config.as_deref())?;

    if let Some(hotkey) = cli.hotkey {
        config.hotkey.key = hotkey;
    }
    if let Some(model) = cli.model {
        config.engine.model = model;
    }
    if cli.toggle {
        config.hotkey.mode = ActivationMode::Toggle;
    }

    config.validate()?;

    match cli.command {
        Commands::Start { background } => {
            supervisor::start(&config, cli.config.as_deref(), background)
        }
        Commands::Stop => supervisor::stop(),
        Commands::Status => supervisor::status(&config, cli.config.as_deref()),
        Commands::Run => supervisor::run_foreground(&config),
    }
}
