mod bootstrap;
mod cli_args;
mod commands;
mod state;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap::init_tracing;
use crate::cli_args::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    commands::run(&cli)
}
