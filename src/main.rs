//! Maestro CLI application entry point.
//!
//! A thin composition layer: parse arguments, initialize logging, route the
//! command, report any fatal error uniformly.

use clap::Parser;

use maestro::app::{handle_fatal_error, init_logging};
use maestro::cli::{execute_command, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = execute_command(cli.command).await {
        handle_fatal_error(e);
    }
}
