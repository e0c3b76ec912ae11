use clap::Parser;
use std::process;

use taskhub::cli;
use taskhub::cli::commands::{Cli, Commands};

fn main() {
    let cli_args = Cli::parse();
    let json_output = cli_args.json;

    let exit_code = match cli_args.command {
        Commands::Init { db } => cli::init::run(db, json_output),
        Commands::Serve { host, port, db } => cli::serve::run(host, port, db, json_output),
    };

    process::exit(exit_code);
}
