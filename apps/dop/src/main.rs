//! dop - source and binary package manager for native software
//!
//! Thin shell over the dopamine crates: parses arguments, wires the
//! dependency services together and reports errors. All real work happens
//! in the library crates.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Command::Resolve(args) => commands::resolve(&cli, args).await,
        Command::Build(args) => commands::build(&cli, args).await,
        Command::Stage(args) => commands::stage(&cli, args).await,
        Command::Profile(args) => commands::profile(&cli, args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "dop=debug" } else { "dop=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
