//! The coder workflow FSM (§4.C): the domain state graph layered on top of
//! [`BaseStateMachine`], plus the approval/question protocols and the
//! standalone `run_with_auto_approvals` driving loop.

use crate::coder::approval::{
    approval_result_key, read_approval_result, ApprovalKind, ApprovalRequest, ApprovalResult,
    ApprovalStatus,
};
use crate::coder::build::BuildBackend;
use crate::coder::llm::{CompletionRequest, LlmClient};
use crate::coder::question::{read_pending_question, read_question_answer, PendingQuestion};
use crate::coder::states::{boxed_predicate, AgentState};
use crate::coder::workspace::WorkspaceManager;
use crate::error::{Error, Result};
use crate::state::{BaseStateMachine, StateData, StateStore};
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default branch-name template used when preparing a workspace.
const DEFAULT_BRANCH_PATTERN: &str = "coder/{story_id}";

fn meta(pairs: impl IntoIterator<Item = (&'static str, serde_json::Value)>) -> StateData {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn question_origin_key() -> &'static str {
    "question_origin"
}

/// The coder's domain FSM: a [`BaseStateMachine`] plus the external
/// collaborators its handlers call out to (LLM, workspace, build backend).
pub struct CoderFsm<S: StateStore> {
    machine: BaseStateMachine<S>,
    llm: Arc<dyn LlmClient>,
    workspace: Arc<dyn WorkspaceManager>,
    build: Arc<dyn BuildBackend>,
    max_reply_tokens: u32,
}

impl<S: StateStore> CoderFsm<S> {
    pub fn new(
        agent_id: impl Into<String>,
        max_retries: u32,
        max_reply_tokens: u32,
        store: Arc<S>,
        llm: Arc<dyn LlmClient>,
        workspace: Arc<dyn WorkspaceManager>,
        build: Arc<dyn BuildBackend>,
    ) -> Self {
        Self {
            machine: BaseStateMachine::new(
                agent_id,
                AgentState::Waiting.as_str(),
                max_retries,
                boxed_predicate(),
                store,
            ),
            llm,
            workspace,
            build,
            max_reply_tokens,
        }
    }

    pub fn agent_id(&self) -> &str {
        self.machine.agent_id()
    }

    pub async fn initialize(&self) -> Result<()> {
        self.machine.initialize().await
    }

    pub async fn persist(&self) -> Result<()> {
        self.machine.persist().await
    }

    pub async fn current_state(&self) -> AgentState {
        self.machine
            .current_state()
            .await
            .parse()
            .expect("persisted state tags are always members of AgentState")
    }

    pub async fn state_data(&self) -> StateData {
        self.machine.state_data().await
    }

    async fn transition(
        &self,
        to: AgentState,
        metadata: StateData,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.machine.transition_to(to.as_str(), metadata, cancel).await
    }

    /// Force a transition to a terminal state bypassing the coder's own
    /// transition table. Used only by [`crate::driver::AgentDriver`]'s
    /// shutdown paths, which must be able to park a coder in ERROR or DONE
    /// no matter which state it was in when the signal arrived.
    pub async fn force_terminal(
        &self,
        to: AgentState,
        metadata: StateData,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.machine.force_transition(to.as_str(), metadata, cancel).await
    }

    /// The WAITING → SETUP edge: a task has arrived for this agent.
    pub async fn start_task(
        &self,
        story_id: impl Into<String>,
        task_content: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let story_id = story_id.into();
        self.transition(
            AgentState::Setup,
            meta([
                ("task_content", json!(task_content.into())),
                ("story_id", json!(story_id)),
            ]),
            cancel,
        )
        .await
    }

    /// Record the outcome of an approval request, per the approval protocol
    /// (§4.C). This only mutates state data; the FSM consults the result on
    /// its *next* `step`, it never blocks waiting for one.
    pub async fn process_approval_result(&self, status: ApprovalStatus, kind: ApprovalKind) {
        let result = ApprovalResult {
            kind,
            status,
            time: Utc::now(),
        };
        self.machine
            .set_state_data(approval_result_key(kind), json!(result))
            .await;
        self.machine
            .set_state_data("pending_approval_request", serde_json::Value::Null)
            .await;
    }

    /// Record a free-text answer to a parked question.
    pub async fn process_answer(&self, answer: impl Into<String>) {
        self.machine
            .set_state_data("question_answer", json!(answer.into()))
            .await;
    }

    /// Dispatch on the current state and run exactly one unit of work.
    /// Returns `true` once a terminal state has been reached.
    pub async fn step(&self, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let state = self.current_state().await;
        match state {
            AgentState::Waiting => Ok(false),
            AgentState::Setup => self.handle_setup(cancel).await,
            AgentState::Planning => self.handle_planning(cancel).await,
            AgentState::PlanReview => self.handle_review(ApprovalKind::Plan, cancel).await,
            AgentState::Coding => self.handle_coding(cancel).await,
            AgentState::Testing => self.handle_testing(cancel).await,
            AgentState::Fixing => self.handle_fixing(cancel).await,
            AgentState::CodeReview => self.handle_review(ApprovalKind::Code, cancel).await,
            AgentState::Question => self.handle_question(cancel).await,
            AgentState::BudgetReview => self.handle_budget_review(cancel).await,
            AgentState::Done | AgentState::Error => Ok(true),
        }
    }

    async fn handle_setup(&self, cancel: &CancellationToken) -> Result<bool> {
        let data = self.state_data().await;
        let story_id = data
            .get("story_id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        match self.workspace.prepare(&story_id, DEFAULT_BRANCH_PATTERN).await {
            Ok(path) => {
                self.transition(
                    AgentState::Planning,
                    meta([
                        ("workspace_path", json!(path.display().to_string())),
                        ("setup_completed_at", json!(Utc::now())),
                    ]),
                    cancel,
                )
                .await?;
                Ok(false)
            }
            Err(e) => {
                self.fail(&format!("workspace setup failed: {e}"), cancel).await?;
                Ok(true)
            }
        }
    }

    async fn handle_planning(&self, cancel: &CancellationToken) -> Result<bool> {
        let data = self.state_data().await;
        let task_content = data
            .get("task_content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let request = CompletionRequest::new(format!("plan: {task_content}"), self.max_reply_tokens);
        match self.llm.complete(cancel, request).await {
            Ok(response) => {
                if let Some(question) = parse_clarification(&response.content) {
                    self.park_question(AgentState::Planning, question, cancel).await?;
                } else {
                    self.park_approval(
                        AgentState::PlanReview,
                        ApprovalKind::Plan,
                        response.content.clone(),
                        "review the generated plan".to_string(),
                        meta([
                            ("plan", json!(response.content)),
                            ("planning_completed_at", json!(Utc::now())),
                        ]),
                        cancel,
                    )
                    .await?;
                }
                Ok(false)
            }
            Err(Error::BudgetExceeded) => {
                self.park_budget(AgentState::Planning, cancel).await?;
                Ok(false)
            }
            Err(e) => {
                self.fail(&format!("planning failed: {e}"), cancel).await?;
                Ok(true)
            }
        }
    }

    async fn handle_review(&self, kind: ApprovalKind, cancel: &CancellationToken) -> Result<bool> {
        let data = self.state_data().await;
        let Some(result) = read_approval_result(&data, kind) else {
            return Ok(false);
        };

        let (approved_state, needs_changes_state) = match kind {
            ApprovalKind::Plan => (AgentState::Coding, AgentState::Planning),
            ApprovalKind::Code => (AgentState::Done, AgentState::Coding),
            ApprovalKind::Budget => unreachable!("budget review uses handle_budget_review"),
        };

        match result.status {
            ApprovalStatus::Approved => {
                let extra = if kind == ApprovalKind::Code {
                    meta([("code_review_completed_at", json!(Utc::now()))])
                } else {
                    StateData::new()
                };
                self.transition(approved_state, extra, cancel).await?;
                Ok(approved_state.is_terminal())
            }
            ApprovalStatus::NeedsChanges => {
                self.transition(needs_changes_state, StateData::new(), cancel).await?;
                Ok(false)
            }
            ApprovalStatus::Rejected => {
                self.fail(&format!("{} rejected", kind.as_str()), cancel).await?;
                Ok(true)
            }
        }
    }

    async fn handle_coding(&self, cancel: &CancellationToken) -> Result<bool> {
        let data = self.state_data().await;
        let plan = data.get("plan").and_then(|v| v.as_str()).unwrap_or_default();

        let request = CompletionRequest::new(format!("implement: {plan}"), self.max_reply_tokens);
        match self.llm.complete(cancel, request).await {
            Ok(response) => {
                self.transition(
                    AgentState::Testing,
                    meta([
                        ("code", json!(response.content)),
                        ("coding_completed_at", json!(Utc::now())),
                    ]),
                    cancel,
                )
                .await?;
                Ok(false)
            }
            Err(Error::BudgetExceeded) => {
                self.park_budget(AgentState::Coding, cancel).await?;
                Ok(false)
            }
            Err(e) => {
                self.fail(&format!("coding failed: {e}"), cancel).await?;
                Ok(true)
            }
        }
    }

    async fn handle_testing(&self, cancel: &CancellationToken) -> Result<bool> {
        let data = self.state_data().await;
        let workspace_path = data
            .get("workspace_path")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        match self.build.run_tests(cancel, &workspace_path).await {
            Ok(outcome) if outcome.passed => {
                self.park_approval(
                    AgentState::CodeReview,
                    ApprovalKind::Code,
                    "tests pass".to_string(),
                    "review the implementation".to_string(),
                    meta([("testing_completed_at", json!(Utc::now()))]),
                    cancel,
                )
                .await?;
                Ok(false)
            }
            Ok(outcome) => {
                self.transition(
                    AgentState::Fixing,
                    meta([("test_output", json!(outcome.output))]),
                    cancel,
                )
                .await?;
                Ok(false)
            }
            Err(e) => {
                self.fail(&format!("test run failed: {e}"), cancel).await?;
                Ok(true)
            }
        }
    }

    async fn handle_fixing(&self, cancel: &CancellationToken) -> Result<bool> {
        if let Err(Error::RetryExhausted(_)) = self.machine.increment_retry().await {
            self.fail_with_reason("retry_exhausted", cancel).await?;
            return Ok(true);
        }

        let data = self.state_data().await;
        let test_output = data
            .get("test_output")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let request = CompletionRequest::new(format!("fix: {test_output}"), self.max_reply_tokens);
        match self.llm.complete(cancel, request).await {
            Ok(response) => {
                self.transition(
                    AgentState::Coding,
                    meta([("plan", json!(response.content))]),
                    cancel,
                )
                .await?;
                Ok(false)
            }
            Err(Error::BudgetExceeded) => {
                self.park_budget(AgentState::Fixing, cancel).await?;
                Ok(false)
            }
            Err(e) => {
                self.fail(&format!("fix attempt failed: {e}"), cancel).await?;
                Ok(true)
            }
        }
    }

    async fn handle_question(&self, cancel: &CancellationToken) -> Result<bool> {
        let data = self.state_data().await;
        let Some(answer) = read_question_answer(&data) else {
            return Ok(false);
        };
        let origin = crate::coder::question::read_question_origin(&data)
            .unwrap_or(AgentState::Planning);

        self.machine
            .set_state_data("pending_question", serde_json::Value::Null)
            .await;

        self.transition(
            origin,
            meta([("question_answer_received", json!(answer))]),
            cancel,
        )
        .await?;
        Ok(false)
    }

    async fn handle_budget_review(&self, cancel: &CancellationToken) -> Result<bool> {
        let data = self.state_data().await;
        let Some(result) = read_approval_result(&data, ApprovalKind::Budget) else {
            return Ok(false);
        };

        match result.status {
            ApprovalStatus::Approved => {
                let origin = data
                    .get("budget_origin")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<AgentState>().ok())
                    .unwrap_or(AgentState::Planning);
                // BUDGET_REVIEW's only listed exit edges are Coding and
                // Planning; FIXING isn't a valid target so a budget event
                // raised there resumes into CODING instead (Open Question a).
                let resume = match origin {
                    AgentState::Planning => AgentState::Planning,
                    _ => AgentState::Coding,
                };
                self.transition(resume, StateData::new(), cancel).await?;
                Ok(false)
            }
            ApprovalStatus::NeedsChanges | ApprovalStatus::Rejected => {
                self.fail("budget review rejected", cancel).await?;
                Ok(true)
            }
        }
    }

    async fn park_approval(
        &self,
        state: AgentState,
        kind: ApprovalKind,
        content: String,
        reason: String,
        extra: StateData,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let request = ApprovalRequest { content, reason, kind };
        let mut metadata = extra;
        metadata.insert("pending_approval_request".to_string(), json!(request));
        metadata.insert(approval_result_key(kind), serde_json::Value::Null);
        self.transition(state, metadata, cancel).await
    }

    async fn park_question(
        &self,
        origin: AgentState,
        question: PendingQuestion,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.transition(
            AgentState::Question,
            meta([
                ("pending_question", json!(question)),
                (question_origin_key(), json!(origin.as_str())),
                ("question_answer", serde_json::Value::Null),
            ]),
            cancel,
        )
        .await
    }

    async fn park_budget(&self, origin: AgentState, cancel: &CancellationToken) -> Result<()> {
        self.park_approval(
            AgentState::BudgetReview,
            ApprovalKind::Budget,
            "token budget exceeded".to_string(),
            "approve continuing past the token budget".to_string(),
            meta([("budget_origin", json!(origin.as_str()))]),
            cancel,
        )
        .await
    }

    async fn fail(&self, reason: &str, cancel: &CancellationToken) -> Result<()> {
        warn!(agent_id = self.agent_id(), reason, "coder entering ERROR");
        self.transition(AgentState::Error, meta([("reason", json!(reason))]), cancel)
            .await
    }

    async fn fail_with_reason(&self, reason: &'static str, cancel: &CancellationToken) -> Result<()> {
        self.fail(reason, cancel).await
    }

    /// Steps the FSM to completion without an attached architect: pending
    /// approval requests are auto-approved and pending questions are
    /// auto-answered, bounded by `max_iterations` (grounded in the Go
    /// CLI's `processWithApprovals`). Used by the `run` CLI subcommand.
    pub async fn run_with_auto_approvals(
        &self,
        cancel: &CancellationToken,
        max_iterations: u32,
    ) -> Result<AgentState> {
        for _ in 0..max_iterations {
            let done = self.step(cancel).await?;
            if done {
                return Ok(self.current_state().await);
            }
            self.auto_resolve_parked_artifacts().await;
        }
        warn!(
            agent_id = self.agent_id(),
            max_iterations, "standalone run hit the iteration cap while still parked"
        );
        Ok(self.current_state().await)
    }

    async fn auto_resolve_parked_artifacts(&self) {
        let state = self.current_state().await;
        let data = self.state_data().await;

        match state {
            AgentState::PlanReview if read_approval_result(&data, ApprovalKind::Plan).is_none() => {
                info!(agent_id = self.agent_id(), "auto-approving plan");
                self.process_approval_result(ApprovalStatus::Approved, ApprovalKind::Plan)
                    .await;
            }
            AgentState::CodeReview if read_approval_result(&data, ApprovalKind::Code).is_none() => {
                info!(agent_id = self.agent_id(), "auto-approving code review");
                self.process_approval_result(ApprovalStatus::Approved, ApprovalKind::Code)
                    .await;
            }
            AgentState::BudgetReview
                if read_approval_result(&data, ApprovalKind::Budget).is_none() =>
            {
                info!(agent_id = self.agent_id(), "auto-approving budget review");
                self.process_approval_result(ApprovalStatus::Approved, ApprovalKind::Budget)
                    .await;
            }
            AgentState::Question if read_question_answer(&data).is_none() => {
                if let Some(question) = read_pending_question(&data) {
                    info!(agent_id = self.agent_id(), question = %question.content, "auto-answering question");
                }
                self.process_answer("acknowledged; proceeding with best judgment")
                    .await;
            }
            _ => {}
        }
    }
}

/// Interprets LLM output via the one convention this crate defines: a
/// response beginning with `NEEDS_CLARIFICATION:` is a blocking question,
/// everything else is plan/code content handled by the caller.
fn parse_clarification(content: &str) -> Option<PendingQuestion> {
    let rest = content.strip_prefix("NEEDS_CLARIFICATION:")?;
    Some(PendingQuestion {
        content: rest.trim().to_string(),
        reason: "llm requested clarification before proceeding".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::build::NullBackend;
    use crate::coder::llm::MockLlmClient;
    use crate::coder::workspace::NullWorkspaceManager;
    use crate::state::FileStateStore;

    async fn harness() -> (CoderFsm<FileStateStore>, tempfile::TempDir, CancellationToken) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStateStore::new(dir.path()).await.unwrap());
        let workspace = Arc::new(NullWorkspaceManager::new(dir.path().join("workspaces")));
        let fsm = CoderFsm::new(
            "agent-1",
            3,
            4096,
            store,
            Arc::new(MockLlmClient::new()),
            workspace,
            Arc::new(NullBackend),
        );
        (fsm, dir, CancellationToken::new())
    }

    #[tokio::test]
    async fn happy_path_reaches_done_with_expected_metadata() {
        let (fsm, _dir, cancel) = harness().await;
        fsm.start_task(
            "story-1",
            "Create a /health endpoint returning JSON {status:ok, timestamp}",
            &cancel,
        )
        .await
        .unwrap();

        let state = fsm
            .run_with_auto_approvals(&cancel, 50)
            .await
            .unwrap();

        assert_eq!(state, AgentState::Done);
        let data = fsm.state_data().await;
        assert!(data.contains_key("planning_completed_at"));
        assert!(data.contains_key("coding_completed_at"));
        assert!(data.contains_key("testing_completed_at"));
        assert!(data.contains_key("code_review_completed_at"));
        assert_eq!(
            data.get("task_content").and_then(|v| v.as_str()),
            Some("Create a /health endpoint returning JSON {status:ok, timestamp}")
        );
    }

    #[tokio::test]
    async fn approval_gate_parks_then_advances_on_approval() {
        let (fsm, _dir, cancel) = harness().await;
        fsm.start_task("story-1", "anything", &cancel).await.unwrap();

        // drive to PLAN_REVIEW
        fsm.step(&cancel).await.unwrap(); // SETUP -> PLANNING
        fsm.step(&cancel).await.unwrap(); // PLANNING -> PLAN_REVIEW
        assert_eq!(fsm.current_state().await, AgentState::PlanReview);

        let data = fsm.state_data().await;
        let request: ApprovalRequest =
            serde_json::from_value(data.get("pending_approval_request").unwrap().clone()).unwrap();
        assert!(!request.content.is_empty());
        assert!(!request.reason.is_empty());

        fsm.process_approval_result(ApprovalStatus::Approved, ApprovalKind::Plan)
            .await;
        fsm.step(&cancel).await.unwrap();
        assert_eq!(fsm.current_state().await, AgentState::Coding);
    }

    #[tokio::test]
    async fn question_round_trip_returns_to_origin() {
        let (fsm, _dir, cancel) = harness().await;
        fsm.start_task(
            "story-1",
            "I need help understanding this unclear requirement",
            &cancel,
        )
        .await
        .unwrap();

        fsm.step(&cancel).await.unwrap(); // SETUP -> PLANNING
        fsm.step(&cancel).await.unwrap(); // PLANNING -> QUESTION
        assert_eq!(fsm.current_state().await, AgentState::Question);

        let data = fsm.state_data().await;
        assert_eq!(
            data.get("question_origin").and_then(|v| v.as_str()),
            Some("PLANNING")
        );

        fsm.process_answer("here is the clarification").await;
        fsm.step(&cancel).await.unwrap();
        assert_ne!(fsm.current_state().await, AgentState::Question);
    }

    #[tokio::test]
    async fn invalid_transition_is_surfaced_and_state_is_unchanged() {
        let (fsm, _dir, cancel) = harness().await;
        // WAITING has no direct edge to CODING.
        let err = fsm
            .transition(AgentState::Coding, StateData::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(fsm.current_state().await, AgentState::Waiting);
    }

    /// Fails its first `run_tests` call, then passes every call after,
    /// used to exercise the TESTING -> FIXING -> CODING loop (S4).
    struct FlakyBackend {
        failures_remaining: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl crate::coder::build::BuildBackend for FlakyBackend {
        async fn detect(&self, _dir: &std::path::Path) -> bool {
            true
        }

        fn name(&self) -> &str {
            "flaky"
        }

        async fn run_tests(
            &self,
            _cancel: &CancellationToken,
            _dir: &std::path::Path,
        ) -> Result<crate::coder::build::TestOutcome> {
            use std::sync::atomic::Ordering;
            if self.failures_remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 { Some(n - 1) } else { None }
            }).is_ok() {
                Ok(crate::coder::build::TestOutcome {
                    passed: false,
                    output: "assertion failed: expected 200, got 500".to_string(),
                })
            } else {
                Ok(crate::coder::build::TestOutcome {
                    passed: true,
                    output: String::new(),
                })
            }
        }
    }

    #[tokio::test]
    async fn budget_review_from_planning_resumes_into_planning() {
        let (fsm, _dir, cancel) = harness().await;
        fsm.start_task("story-1", "over_budget please", &cancel)
            .await
            .unwrap();

        fsm.step(&cancel).await.unwrap(); // SETUP -> PLANNING
        fsm.step(&cancel).await.unwrap(); // PLANNING -> BUDGET_REVIEW
        assert_eq!(fsm.current_state().await, AgentState::BudgetReview);

        let data = fsm.state_data().await;
        assert_eq!(
            data.get("budget_origin").and_then(|v| v.as_str()),
            Some("PLANNING")
        );

        fsm.process_approval_result(ApprovalStatus::Approved, ApprovalKind::Budget)
            .await;
        fsm.step(&cancel).await.unwrap(); // BUDGET_REVIEW -> PLANNING
        assert_eq!(fsm.current_state().await, AgentState::Planning);
    }

    #[tokio::test]
    async fn budget_review_from_coding_resumes_into_coding() {
        let (fsm, _dir, cancel) = harness().await;
        fsm.start_task("story-1", "anything", &cancel).await.unwrap();

        fsm.step(&cancel).await.unwrap(); // SETUP -> PLANNING
        fsm.step(&cancel).await.unwrap(); // PLANNING -> PLAN_REVIEW
        fsm.process_approval_result(ApprovalStatus::Approved, ApprovalKind::Plan)
            .await;
        fsm.step(&cancel).await.unwrap(); // PLAN_REVIEW -> CODING

        // Swap the plan content so the CODING handler's LLM call trips the
        // budget-exceeded convention.
        fsm.machine
            .set_state_data("plan", json!("over_budget please"))
            .await;
        fsm.step(&cancel).await.unwrap(); // CODING -> BUDGET_REVIEW
        assert_eq!(fsm.current_state().await, AgentState::BudgetReview);

        let data = fsm.state_data().await;
        assert_eq!(
            data.get("budget_origin").and_then(|v| v.as_str()),
            Some("CODING")
        );

        fsm.process_approval_result(ApprovalStatus::Approved, ApprovalKind::Budget)
            .await;
        fsm.step(&cancel).await.unwrap(); // BUDGET_REVIEW -> CODING
        assert_eq!(fsm.current_state().await, AgentState::Coding);
    }

    #[tokio::test]
    async fn budget_review_rejected_fails_the_agent() {
        let (fsm, _dir, cancel) = harness().await;
        fsm.start_task("story-1", "over_budget please", &cancel)
            .await
            .unwrap();

        fsm.step(&cancel).await.unwrap(); // SETUP -> PLANNING
        fsm.step(&cancel).await.unwrap(); // PLANNING -> BUDGET_REVIEW

        fsm.process_approval_result(ApprovalStatus::Rejected, ApprovalKind::Budget)
            .await;
        let done = fsm.step(&cancel).await.unwrap();
        assert!(done);
        assert_eq!(fsm.current_state().await, AgentState::Error);
    }

    #[tokio::test]
    async fn test_fail_then_fix_loop_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStateStore::new(dir.path()).await.unwrap());
        let workspace = Arc::new(NullWorkspaceManager::new(dir.path().join("workspaces")));
        let fsm = CoderFsm::new(
            "agent-1",
            3,
            4096,
            store,
            Arc::new(MockLlmClient::new()),
            workspace,
            Arc::new(FlakyBackend {
                failures_remaining: std::sync::atomic::AtomicU32::new(1),
            }),
        );
        let cancel = CancellationToken::new();

        fsm.start_task("story-1", "ship the feature", &cancel)
            .await
            .unwrap();

        let mut trace = vec![fsm.current_state().await];
        for _ in 0..50 {
            let done = fsm.step(&cancel).await.unwrap();
            fsm.auto_resolve_parked_artifacts().await;
            trace.push(fsm.current_state().await);
            if done {
                break;
            }
        }

        assert_eq!(*trace.last().unwrap(), AgentState::Done);
        assert!(trace.iter().any(|s| *s == AgentState::Fixing));
    }
}
