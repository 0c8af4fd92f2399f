//! # Maestro
//!
//! A crash-safe orchestrator for long-running, LLM-backed coding agents.
//!
//! A coder agent works a single story through a planning/coding/testing/
//! review workflow, parking at approval and question gates rather than
//! blocking, so that an architect (or, standalone, an auto-approving CLI
//! run) can drive it forward at its own pace. Every transition is persisted
//! before it is considered to have happened, so a crashed or killed process
//! resumes exactly where it left off.
//!
//! ## Modules
//!
//! - `state` - the durable snapshot store and the generic, transition-
//!   validated state machine every concrete FSM is built on
//! - `coder` - the coder workflow FSM: states, approval/question protocols,
//!   and the LLM/workspace/build-backend collaborators it calls out to
//! - `queue` - the story queue: dependency resolution, ready-set
//!   computation, and cycle detection
//! - `shutdown` - the LIFO, bounded graceful-shutdown coordinator
//! - `driver` - the agent loop binding the state store, coder FSM, and
//!   shutdown coordinator into a single run loop
//! - `proto` - the agent message envelope exchanged between the CLI, the
//!   architect, and coders
//! - `config` - application configuration, loaded from an optional TOML file
//! - `error` - the crate's error type
//! - `app` - process-level wiring: logging initialization and fatal-error
//!   reporting
//! - `cli` - command-line argument structures and command routing

pub mod app;
pub mod cli;
pub mod coder;
pub mod config;
pub mod driver;
pub mod error;
pub mod proto;
pub mod queue;
pub mod shutdown;
pub mod state;

pub use error::{Error, Result};
