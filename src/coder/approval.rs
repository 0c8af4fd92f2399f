//! The approval protocol: a parked artifact awaiting an external
//! `APPROVED`/`NEEDS_CHANGES`/`REJECTED` verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
    Approved,
    NeedsChanges,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    Plan,
    Code,
    Budget,
}

impl ApprovalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalKind::Plan => "plan",
            ApprovalKind::Code => "code",
            ApprovalKind::Budget => "budget",
        }
    }
}

/// Recorded into `state_data["pending_approval_request"]` when the FSM
/// parks in PLAN_REVIEW, CODE_REVIEW, or BUDGET_REVIEW.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub content: String,
    pub reason: String,
    pub kind: ApprovalKind,
}

/// Recorded into `state_data["<kind>_approval_result"]` once the driver
/// delivers an outcome via `process_approval_result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResult {
    #[serde(rename = "type")]
    pub kind: ApprovalKind,
    pub status: ApprovalStatus,
    pub time: DateTime<Utc>,
}

pub fn approval_result_key(kind: ApprovalKind) -> String {
    format!("{}_approval_result", kind.as_str())
}

/// Parse a typed `ApprovalResult` back out of the raw state-data map. The
/// map remains the source of truth for persistence; this exists so call
/// sites stop re-decoding `serde_json::Value` by hand (Design Note,
/// "Metadata-typed values").
pub fn read_approval_result(
    state_data: &crate::state::StateData,
    kind: ApprovalKind,
) -> Option<ApprovalResult> {
    state_data
        .get(&approval_result_key(kind))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}
