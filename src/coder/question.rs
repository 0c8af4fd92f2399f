//! The question protocol: a parked artifact awaiting an external free-text
//! answer, and the typed accessors around it (Design Note, "Metadata-typed
//! values").

use crate::coder::states::AgentState;
use crate::state::StateData;
use serde::{Deserialize, Serialize};

/// Recorded into `state_data["pending_question"]` when the FSM parks in
/// QUESTION.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingQuestion {
    pub content: String,
    pub reason: String,
}

/// Read back the state the FSM should resume to once an answer arrives.
/// `question_origin` is stored as the plain state tag string so it survives
/// a crash/restart round-trip without needing its own schema version.
pub fn read_question_origin(state_data: &StateData) -> Option<AgentState> {
    state_data
        .get("question_origin")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}

pub fn read_pending_question(state_data: &StateData) -> Option<PendingQuestion> {
    state_data
        .get("pending_question")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Read back the free-text answer once `process_answer` has recorded one.
pub fn read_question_answer(state_data: &StateData) -> Option<String> {
    state_data
        .get("question_answer")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
