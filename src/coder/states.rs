//! The coder's state graph: the `AgentState` tag enum and its static
//! adjacency table.
//!
//! The table is data, not scattered conditionals (Design Note, "Transition
//! table"): `is_valid_coder_transition` is a single lookup against a
//! `once_cell::sync::Lazy` slice of edges seeded at first use.

use once_cell::sync::Lazy;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentState {
    Waiting,
    Setup,
    Planning,
    PlanReview,
    Coding,
    Testing,
    Fixing,
    CodeReview,
    Question,
    BudgetReview,
    Done,
    Error,
}

impl AgentState {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Waiting => "WAITING",
            AgentState::Setup => "SETUP",
            AgentState::Planning => "PLANNING",
            AgentState::PlanReview => "PLAN_REVIEW",
            AgentState::Coding => "CODING",
            AgentState::Testing => "TESTING",
            AgentState::Fixing => "FIXING",
            AgentState::CodeReview => "CODE_REVIEW",
            AgentState::Question => "QUESTION",
            AgentState::BudgetReview => "BUDGET_REVIEW",
            AgentState::Done => "DONE",
            AgentState::Error => "ERROR",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Done | AgentState::Error)
    }

    pub fn all() -> &'static [AgentState] {
        &[
            AgentState::Waiting,
            AgentState::Setup,
            AgentState::Planning,
            AgentState::PlanReview,
            AgentState::Coding,
            AgentState::Testing,
            AgentState::Fixing,
            AgentState::CodeReview,
            AgentState::Question,
            AgentState::BudgetReview,
            AgentState::Done,
            AgentState::Error,
        ]
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentState {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentState::all()
            .iter()
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| crate::error::Error::Parse(format!("unknown agent state: {s}")))
    }
}

/// Static edge list for the coder's state graph. DONE and ERROR are
/// terminal and deliberately have no outbound edges here.
static EDGES: Lazy<Vec<(AgentState, AgentState)>> = Lazy::new(|| {
    use AgentState::*;
    vec![
        (Waiting, Setup),
        (Setup, Planning),
        (Setup, Error),
        (Planning, PlanReview),
        (Planning, Question),
        (Planning, BudgetReview),
        (Planning, Error),
        (PlanReview, Coding),
        (PlanReview, Planning),
        (PlanReview, Error),
        (Coding, Testing),
        (Coding, BudgetReview),
        (Coding, Error),
        (Testing, CodeReview),
        (Testing, Fixing),
        (Testing, Error),
        (Fixing, Coding),
        (Fixing, Error),
        (CodeReview, Done),
        (CodeReview, Coding),
        (CodeReview, Error),
        (Question, Planning),
        (Question, Coding),
        (Question, Testing),
        (Question, Fixing),
        (Question, CodeReview),
        (BudgetReview, Coding),
        (BudgetReview, Planning),
        (BudgetReview, Error),
    ]
});

/// The single source of truth for which coder transitions are legal.
/// Terminal states (`DONE`, `ERROR`) never have an outbound edge, even if
/// one were accidentally added to `EDGES`.
pub fn is_valid_coder_transition(from: AgentState, to: AgentState) -> bool {
    if from.is_terminal() {
        return false;
    }
    EDGES.iter().any(|&(f, t)| f == from && t == to)
}

/// Boxed predicate form for injection into `BaseStateMachine`, which speaks
/// string tags rather than the `AgentState` enum.
pub fn boxed_predicate() -> crate::state::IsValidTransition {
    Box::new(|from: &str, to: &str| {
        let (Ok(from), Ok(to)) = (from.parse::<AgentState>(), to.parse::<AgentState>()) else {
            return false;
        };
        is_valid_coder_transition(from, to)
    })
}
