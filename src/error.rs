//! Crate-wide error type.
//!
//! Every fallible subsystem in the core (state store, state machine,
//! story queue, shutdown coordinator) returns this type. `main.rs` and the
//! CLI command layer work in terms of `anyhow::Result` and convert at the
//! boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("story front-matter parse error: {0}")]
    StoryParse(#[from] serde_yaml::Error),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("agent id cannot be empty")]
    EmptyAgentId,

    #[error("persistence error for agent {agent_id}: {reason}")]
    Persistence { agent_id: String, reason: String },

    #[error("retry exhausted: {0}")]
    RetryExhausted(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("llm budget exceeded")]
    BudgetExceeded,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("story {0} not found")]
    StoryNotFound(String),

    #[error("invalid story status transition for {id}: expected {expected}, got {actual}")]
    InvalidStoryTransition {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("shutdown of component {name} timed out after {timeout_ms}ms")]
    ShutdownTimeout { name: String, timeout_ms: u64 },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
