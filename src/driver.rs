//! The agent loop (§4.F): binds the state store (A), the coder FSM (C), and
//! the shutdown coordinator (E) into a single run loop.
//!
//! Grounded on the Go original's `ShutdownableDriver` (`pkg/agent/shutdown.go`):
//! a crash path that persists best-effort and parks in ERROR with
//! `can_resume: true`, kept distinct from a clean path that persists and
//! finishes in DONE with `shutdown_clean: true` (Design Note, Open Question c).
//!
//! `resume()` is the crash path's inverse: it clears those markers and
//! returns the agent to the state it was parked from.

use crate::coder::{AgentState, CoderFsm};
use crate::error::Result;
use crate::shutdown::Shutdownable;
use crate::state::{StateData, StateStore};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long the loop backs off between `step`s that make no progress (the
/// agent is parked waiting on an external approval/answer). Real deployments
/// would replace this with a wake-on-signal channel from the architect;
/// nothing in the spec mandates one, so polling with a short idle backoff is
/// the concrete choice here.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Drives a single coder FSM to a terminal state, honoring cancellation
/// from a [`crate::shutdown::ShutdownCoordinator`].
pub struct AgentDriver<S: StateStore> {
    fsm: Arc<CoderFsm<S>>,
    cancel: CancellationToken,
}

impl<S: StateStore> AgentDriver<S> {
    pub fn new(fsm: Arc<CoderFsm<S>>, cancel: CancellationToken) -> Self {
        Self { fsm, cancel }
    }

    pub fn fsm(&self) -> &Arc<CoderFsm<S>> {
        &self.fsm
    }

    /// Step the FSM until it reaches DONE/ERROR or the cancellation token
    /// fires. On cancellation, runs the crash-safe shutdown path (§4.E
    /// "Driver integration") rather than returning a bare `Cancelled` error.
    ///
    /// A `step` that parks (returns `Ok(false)` without changing state)
    /// backs off briefly before re-invoking rather than busy-looping, so an
    /// architect delivering an approval or answer concurrently is picked up
    /// on the next poll.
    pub async fn run(&self) -> Result<AgentState> {
        loop {
            if self.cancel.is_cancelled() {
                self.handle_shutdown().await?;
                return Ok(self.fsm.current_state().await);
            }

            let before = self.fsm.current_state().await;
            match self.fsm.step(&self.cancel).await {
                Ok(true) => return Ok(self.fsm.current_state().await),
                Ok(false) => {
                    if self.fsm.current_state().await == before {
                        tokio::select! {
                            _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                            _ = self.cancel.cancelled() => {}
                        }
                    }
                }
                Err(crate::error::Error::Cancelled) => {
                    self.handle_shutdown().await?;
                    return Ok(self.fsm.current_state().await);
                }
                Err(e) => {
                    warn!(agent_id = self.fsm.agent_id(), error = %e, "agent loop step failed");
                    return Err(e);
                }
            }
        }
    }

    /// Crash path: best-effort persist, then park in ERROR with a
    /// resumability marker. Never propagates a persistence failure, since a
    /// driver already reacting to shutdown has nowhere further to escalate.
    async fn handle_shutdown(&self) -> Result<()> {
        if let Err(e) = self.fsm.persist().await {
            warn!(agent_id = self.fsm.agent_id(), error = %e, "best-effort persist during shutdown failed");
        }

        let state = self.fsm.current_state().await;
        if state.is_terminal() {
            return Ok(());
        }

        info!(agent_id = self.fsm.agent_id(), %state, "agent loop cancelled, parking for resume");
        let uncancelled = CancellationToken::new();
        self.fsm
            .force_terminal(
                AgentState::Error,
                shutdown_metadata(state),
                &uncancelled,
            )
            .await
    }

    /// `resume()` (§4.E): the inverse of the crash path. Clears the
    /// `can_resume`/`shutdown_reason`/origin markers and force-transitions
    /// the agent from ERROR back to the state it was parked from, then
    /// re-persists via `force_terminal`. Errors if the agent isn't currently
    /// parked with a resumable marker.
    pub async fn resume(&self) -> Result<AgentState> {
        let state = self.fsm.current_state().await;
        let data = self.fsm.state_data().await;
        if state != AgentState::Error || !can_resume(&data, state) {
            return Err(crate::error::Error::Other(format!(
                "agent {} has no resumable shutdown marker in state {state}",
                self.fsm.agent_id()
            )));
        }

        let origin: AgentState = data
            .get("shutdown_origin_state")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(AgentState::Setup);

        info!(agent_id = self.fsm.agent_id(), %origin, "resuming agent parked by shutdown");
        let uncancelled = CancellationToken::new();
        let mut cleared = StateData::new();
        cleared.insert("can_resume".to_string(), json!(false));
        cleared.insert("shutdown_reason".to_string(), serde_json::Value::Null);
        cleared.insert("shutdown_origin_state".to_string(), serde_json::Value::Null);
        self.fsm.force_terminal(origin, cleared, &uncancelled).await?;
        Ok(origin)
    }

    /// Clean path: finish in DONE with `shutdown_clean: true` rather than
    /// ERROR. Used when the driver is told to stop without the agent having
    /// reached a terminal state on its own (e.g. pool drain on a healthy
    /// coder that never got a task).
    pub async fn shutdown_clean(&self) -> Result<()> {
        let state = self.fsm.current_state().await;
        if state.is_terminal() {
            return self.fsm.persist().await;
        }

        let uncancelled = CancellationToken::new();
        self.fsm
            .force_terminal(
                AgentState::Done,
                clean_shutdown_metadata(),
                &uncancelled,
            )
            .await
    }
}

fn shutdown_metadata(origin: AgentState) -> StateData {
    let mut data = StateData::new();
    data.insert("shutdown_reason".to_string(), json!("graceful_shutdown"));
    data.insert("can_resume".to_string(), json!(true));
    data.insert("shutdown_time".to_string(), json!(Utc::now()));
    data.insert("shutdown_origin_state".to_string(), json!(origin.as_str()));
    data
}

fn clean_shutdown_metadata() -> StateData {
    let mut data = StateData::new();
    data.insert("shutdown_clean".to_string(), json!(true));
    data.insert("shutdown_time".to_string(), json!(Utc::now()));
    data
}

/// Whether a persisted agent is eligible to resume: an explicit
/// `can_resume` marker, or simply not having finished (any non-terminal
/// state is, by construction, a "waiting" one from the driver's point of
/// view).
pub fn can_resume(state_data: &StateData, current_state: AgentState) -> bool {
    let explicit = state_data
        .get("can_resume")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    explicit || !current_state.is_terminal()
}

#[async_trait]
impl<S: StateStore> Shutdownable for AgentDriver<S> {
    async fn shutdown(&self) -> Result<()> {
        self.handle_shutdown().await
    }
}
