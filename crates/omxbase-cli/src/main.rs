// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

mod abend;
mod components;
mod driver;
mod error;
mod lifecycle;
mod utils;

use clap::{Parser, Subcommand};
use error::result_to_exit_code;
use std::process::ExitCode;

/// omxbase CLI - Drive codec components through their lifecycle
#[derive(Parser)]
#[command(name = "omxbase")]
#[command(version)]
#[command(about = "omxbase CLI - Drive codec components through their lifecycle")]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (use RUST_LOG=debug for more)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output run summaries in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a component Loaded -> Idle -> Executing -> Idle -> Loaded
    Lifecycle(lifecycle::Args),

    /// Abnormally terminate a component blocked waiting for its buffers
    Abend(abend::Args),

    /// List registered components and their roles
    Components(components::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Lifecycle(args) => lifecycle::execute(args, cli.json),
        Commands::Abend(args) => abend::execute(args, cli.json),
        Commands::Components(args) => components::execute(args, cli.json),
    };

    result_to_exit_code(result)
}

/// Initialize env_logger based on verbosity flags
fn init_logging(verbose: bool, quiet: bool) {
    let env = env_logger::Env::default();

    let env = if quiet {
        env.default_filter_or("error")
    } else if verbose {
        env.default_filter_or("debug")
    } else {
        env.default_filter_or("info")
    };

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();

    log::debug!("Logging initialized");
}
