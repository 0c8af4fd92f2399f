//! Command routing: dispatches a parsed [`Commands`] to its implementation.

use crate::cli::args::Commands;
use crate::cli::commands;
use anyhow::Result;

pub async fn execute_command(command: Option<Commands>) -> Result<()> {
    match command {
        Some(Commands::Run {
            agent,
            input,
            workdir,
            cleanup,
        }) => commands::run_agent(agent, input, workdir, cleanup).await,
        Some(Commands::BootstrapDocker { path }) => commands::bootstrap_docker(path).await,
        None => {
            use clap::CommandFactory;
            crate::cli::args::Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
