use anyhow::Result;
use clap::Parser;
use dappget_core::{DappGetConfig, console};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Command};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        console::error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Cli::parse();
    let mut config = DappGetConfig::from_env();
    if args.verbose {
        config.verbose = true;
    }

    init_tracing(config.verbose)?;

    match args.command {
        Command::Resolve(args) => commands::resolve::run(args, &config).await,
        Command::Update(args) => commands::update::run(args, &config).await,
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
