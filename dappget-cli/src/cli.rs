use crate::commands;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "dappget",
    about = "resolve DAppNode package dependencies",
    version,
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the full set of versions a request resolves to
    Resolve(commands::resolve::ResolveArgs),
    /// Print only the packages that would be installed or upgraded
    Update(commands::update::UpdateArgs),
}
