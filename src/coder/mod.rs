//! The coder workflow FSM (§4.C): domain states, the approval and question
//! protocols, and the external collaborators (LLM, workspace, build
//! backend) its handlers call out to.

pub mod approval;
pub mod build;
pub mod fsm;
pub mod llm;
pub mod question;
pub mod states;
pub mod workspace;

pub use approval::{ApprovalKind, ApprovalRequest, ApprovalResult, ApprovalStatus};
pub use build::{BuildBackend, NullBackend, TestOutcome};
pub use fsm::CoderFsm;
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, MockLlmClient, ProcessLlmClient};
pub use question::PendingQuestion;
pub use states::AgentState;
pub use workspace::{GitWorktreeManager, NullWorkspaceManager, WorkspaceManager};
