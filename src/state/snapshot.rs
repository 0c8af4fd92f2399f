//! Persisted-state data types.
//!
//! `state_data` is kept as an open `HashMap<String, Value>`: callers stash
//! arbitrary JSON under arbitrary keys, but the handful of *reserved* keys
//! the FSM relies on (`question_origin`, `<kind>_approval_result`, the
//! `*_completed_at` timestamps) get typed accessors in `coder::approval` and
//! `coder::question` so nothing downstream re-decodes `Value` by hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type StateData = HashMap<String, serde_json::Value>;

/// A single recorded transition between two FSM states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: String,
    pub to_state: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: StateData,
}

/// Minimal context recorded alongside every persisted snapshot, per the
/// on-disk contract inherited from the Go original's `ContextSnapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub agent_id: String,
    pub saved_at: DateTime<Utc>,
    pub state: String,
}

/// The full on-disk form of one agent's recoverable state.
///
/// `version` is carried so that future migrations can detect and upgrade
/// older snapshots; this crate only ever writes `CURRENT_SNAPSHOT_VERSION`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub version: u32,
    pub current_state: String,
    #[serde(default)]
    pub state_data: StateData,
    #[serde(default)]
    pub transitions: Vec<StateTransition>,
    #[serde(default)]
    pub retry_count: u32,
    pub last_timestamp: DateTime<Utc>,
    pub context_snapshot: ContextSnapshot,
}

pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

impl AgentSnapshot {
    pub fn new(agent_id: &str, current_state: &str, state_data: StateData) -> Self {
        let now = Utc::now();
        Self {
            version: CURRENT_SNAPSHOT_VERSION,
            current_state: current_state.to_string(),
            state_data,
            transitions: Vec::new(),
            retry_count: 0,
            last_timestamp: now,
            context_snapshot: ContextSnapshot {
                agent_id: agent_id.to_string(),
                saved_at: now,
                state: current_state.to_string(),
            },
        }
    }
}
