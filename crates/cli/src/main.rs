mod cli;
mod create_cmd;
mod guess_cmd;
mod logging;
mod print_cmd;

use std::process;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Create(args) => create_cmd::run(args),
        Command::Print(args) => print_cmd::run(args),
        Command::Guess(args) => guess_cmd::run(args),
    }
}
