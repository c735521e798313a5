mod cli;
mod commands;
mod context;
mod error;
mod input;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use error::exit_with_error;

fn init_tracing(cli: &Cli) {
    // The CLI depends on library crates that emit `tracing` events.
    // Without an installed subscriber, `RUST_LOG=...` has no effect.
    //
    // Default to "off" so NDJSON pipelines stay clean unless the user
    // opts in via `RUST_LOG`.
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "off".into());

    let ansi = !(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        exit_with_error(e);
    }
}

async fn run(cli: Cli) -> error::CliResult<()> {
    match &cli.command {
        Commands::List { prefix } => commands::list::run(&cli, prefix.clone()).await,
        Commands::Hash { key } => commands::hash::run(&cli, key.clone()).await,
        Commands::Copy { key, max_put_size } => {
            commands::copy::run(&cli, key.clone(), *max_put_size).await
        }
        Commands::Head { key } => commands::head::run(&cli, key.clone()).await,
        Commands::Index { key } => commands::index::run(&cli, key.clone()).await,
        Commands::Errors => commands::errors::run(),
    }
}
