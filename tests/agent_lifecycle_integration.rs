//! End-to-end integration tests driving the public API across subsystem
//! boundaries: queue readiness feeding a coder run, crash-safe resume via
//! the state store, and the driver's shutdown path.

use maestro::coder::{
    AgentState, ApprovalKind, ApprovalStatus, CoderFsm, MockLlmClient, NullBackend,
    NullWorkspaceManager,
};
use maestro::driver::AgentDriver;
use maestro::queue::{QueuedStory, StoryQueue, StoryStatus};
use maestro::state::FileStateStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn make_fsm(dir: &std::path::Path, agent_id: &str) -> CoderFsm<FileStateStore> {
    let store = Arc::new(FileStateStore::new(dir.join(".maestro")).await.unwrap());
    let workspace = Arc::new(NullWorkspaceManager::new(dir.join("workspaces")));
    CoderFsm::new(
        agent_id,
        3,
        4096,
        store,
        Arc::new(MockLlmClient::new()),
        workspace,
        Arc::new(NullBackend),
    )
}

/// A ready story picked off the queue drives a coder to DONE, and the
/// queue's own status transitions follow the agent's lifecycle.
#[tokio::test]
async fn ready_story_drives_a_coder_to_completion() {
    let dir = tempfile::tempdir().unwrap();

    let queue = StoryQueue::from_stories(vec![QueuedStory::new(
        "story-1",
        "Add a health check endpoint",
        vec![],
        1,
        "Create a /health endpoint returning JSON {status:ok, timestamp}",
    )]);

    let ready = queue.next_ready_story().expect("one ready story");
    assert_eq!(ready.id, "story-1");

    queue.mark_in_progress(&ready.id, "agent-1").unwrap();
    assert!(queue.ready_stories().is_empty());

    let fsm = make_fsm(dir.path(), "agent-1").await;
    let cancel = CancellationToken::new();
    fsm.start_task(&ready.id, &ready.body, &cancel).await.unwrap();

    let driver = AgentDriver::new(Arc::new(fsm), cancel.clone());
    let approver = {
        let fsm = driver.fsm().clone();
        tokio::spawn(async move {
            loop {
                match fsm.current_state().await {
                    AgentState::PlanReview => {
                        fsm.process_approval_result(ApprovalStatus::Approved, ApprovalKind::Plan)
                            .await
                    }
                    AgentState::CodeReview => {
                        fsm.process_approval_result(ApprovalStatus::Approved, ApprovalKind::Code)
                            .await
                    }
                    AgentState::Done | AgentState::Error => return,
                    _ => {}
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
    };

    let final_state = driver.run().await.unwrap();
    approver.abort();
    assert_eq!(final_state, AgentState::Done);

    queue.mark_completed(&ready.id).unwrap();
    let summary = queue.queue_summary();
    assert_eq!(summary.completed_points, 1);
    assert_eq!(summary.in_progress, 0);
}

/// A coder interrupted mid-run persists with a resumability marker, and a
/// freshly-constructed FSM over the same store/id picks up exactly where
/// the interrupted one left off.
#[tokio::test]
async fn interrupted_coder_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let first = make_fsm(dir.path(), "agent-1").await;
    first
        .start_task("story-1", "ship the feature", &cancel)
        .await
        .unwrap();
    first.step(&cancel).await.unwrap(); // SETUP -> PLANNING
    cancel.cancel();

    let driver = AgentDriver::new(Arc::new(first), cancel.clone());
    let state = driver.run().await.unwrap();
    assert_eq!(state, AgentState::Error);

    let data = driver.fsm().state_data().await;
    assert_eq!(data.get("can_resume").and_then(|v| v.as_bool()), Some(true));

    let restarted = make_fsm(dir.path(), "agent-1").await;
    restarted.initialize().await.unwrap();
    assert_eq!(restarted.current_state().await, AgentState::Error);
    assert_eq!(
        restarted
            .state_data()
            .await
            .get("can_resume")
            .and_then(|v| v.as_bool()),
        Some(true)
    );
}

/// A story with an incomplete dependency never becomes ready, and marking
/// the dependency complete unblocks it without touching unrelated stories.
#[tokio::test]
async fn dependent_story_unblocks_once_its_dependency_completes() {
    let queue = StoryQueue::from_stories(vec![
        QueuedStory::new("001", "Base", vec![], 1, ""),
        QueuedStory::new("002", "Depends on base", vec!["001".to_string()], 1, ""),
    ]);

    assert_eq!(
        queue.ready_stories().iter().map(|s| s.id.clone()).collect::<Vec<_>>(),
        vec!["001".to_string()]
    );

    queue.mark_in_progress("001", "agent-1").unwrap();
    assert!(queue.ready_stories().is_empty());

    queue.mark_completed("001").unwrap();
    let ready: Vec<String> = queue.ready_stories().into_iter().map(|s| s.id).collect();
    assert_eq!(ready, vec!["002".to_string()]);

    assert_eq!(queue.get("001").unwrap().status, StoryStatus::Completed);
}
