// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `noema` binary entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod serve;

#[derive(Parser)]
#[command(name = "noema", version, about = "Event-driven thought-analysis pipeline")]
struct Cli {
    /// Path to a noema.toml config file (defaults to the standard lookup).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker, sweeper, and gateway (default).
    Serve,
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<noema_config::NoemaConfig, String> {
    let config = match path {
        Some(path) => noema_config::load_config_from_path(path),
        None => noema_config::load_config(),
    }
    .map_err(|e| format!("failed to load configuration: {e}"))?;

    noema_config::validate_config(&config)
        .map_err(|errors| format!("invalid configuration:\n  - {}", errors.join("\n  - ")))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckConfig => {
            println!("configuration ok");
            ExitCode::SUCCESS
        }
        Command::Serve => match serve::run_serve(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
    }
}
