//! CLI argument structures.
//!
//! Mirrors the teacher's own `cli::args` split: one `Cli` root plus a
//! `Commands` enum, each variant documented with the flags it accepts.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// maestro - drive LLM-backed coding agents through a crash-safe workflow
#[derive(Parser)]
#[command(name = "maestro")]
#[command(about = "maestro - drive LLM-backed coding agents through a crash-safe workflow", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Which agent role `run` should drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AgentKind {
    Coder,
    Architect,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single agent to completion
    #[command(name = "run")]
    Run {
        /// Which agent role to drive
        agent: AgentKind,

        /// Agent message file to load (STORY message for a coder)
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Working directory for state and workspace files (defaults to cwd)
        #[arg(long, value_name = "DIR")]
        workdir: Option<PathBuf>,

        /// Remove the working directory once the agent reaches a terminal state
        #[arg(long)]
        cleanup: bool,
    },

    /// Generate a Dockerfile and .dockerignore for the detected project backend
    #[command(name = "bootstrap-docker")]
    BootstrapDocker {
        /// Project directory to inspect (defaults to cwd)
        #[arg(long, value_name = "DIR")]
        path: Option<PathBuf>,
    },
}
