//! Transition-validated, mutex-guarded state machine wrapping [`StateStore`].
//!
//! The graph itself is not known here: `BaseStateMachine` is generic over an
//! `IsValidTransition` predicate supplied at construction, so the same
//! persistence/locking/retry machinery serves any concrete FSM (the coder FSM
//! today, potentially an architect FSM later).

use crate::error::{Error, Result};
use crate::state::snapshot::{AgentSnapshot, StateData, StateTransition};
use crate::state::store::StateStore;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const MAX_TRANSITION_HISTORY: usize = 100;

/// A predicate over `(from, to)` state-tag pairs, owned by the concrete FSM
/// and injected into the base machine. Boxed rather than generic so
/// `BaseStateMachine` itself stays free of any particular `AgentState` type.
pub type IsValidTransition = Box<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Mutable, lock-guarded state shared across `transition_to` calls.
struct Inner {
    current_state: String,
    state_data: StateData,
    transitions: Vec<StateTransition>,
    retry_count: u32,
}

/// Generic, persistence-backed, transition-validated state machine.
///
/// All mutation goes through `transition_to`, which takes the instance's
/// async mutex for the duration of validation + persistence so that
/// `current_state()` always reflects the most recently *persisted*
/// transition (§5 ordering guarantee).
pub struct BaseStateMachine<S: StateStore> {
    agent_id: String,
    initial_state: String,
    max_retries: u32,
    is_valid_transition: IsValidTransition,
    store: Arc<S>,
    inner: tokio::sync::Mutex<Inner>,
}

impl<S: StateStore> BaseStateMachine<S> {
    pub fn new(
        agent_id: impl Into<String>,
        initial_state: impl Into<String>,
        max_retries: u32,
        is_valid_transition: IsValidTransition,
        store: Arc<S>,
    ) -> Self {
        let initial_state = initial_state.into();
        Self {
            agent_id: agent_id.into(),
            initial_state: initial_state.clone(),
            max_retries,
            is_valid_transition,
            store,
            inner: tokio::sync::Mutex::new(Inner {
                current_state: initial_state,
                state_data: StateData::new(),
                transitions: Vec::new(),
                retry_count: 0,
            }),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub async fn current_state(&self) -> String {
        self.inner.lock().await.current_state.clone()
    }

    pub async fn state_data(&self) -> StateData {
        self.inner.lock().await.state_data.clone()
    }

    pub async fn state_value(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.lock().await.state_data.get(key).cloned()
    }

    pub async fn set_state_data(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.lock().await.state_data.insert(key.into(), value);
    }

    pub async fn retry_count(&self) -> u32 {
        self.inner.lock().await.retry_count
    }

    /// Load any existing snapshot for this agent id. An absent snapshot is
    /// first-run success, not an error.
    pub async fn initialize(&self) -> Result<()> {
        let Some(snapshot) = self.store.load::<AgentSnapshot>(&self.agent_id).await? else {
            debug!(agent_id = %self.agent_id, "no prior snapshot, starting fresh");
            return Ok(());
        };

        let mut guard = self.inner.lock().await;
        guard.current_state = snapshot.current_state;
        guard.state_data = snapshot.state_data;
        guard.transitions = snapshot.transitions;
        guard.retry_count = snapshot.retry_count;
        debug!(agent_id = %self.agent_id, state = %guard.current_state, "restored snapshot");
        Ok(())
    }

    /// Validate and apply a transition under the instance lock, then persist.
    ///
    /// Checks cancellation before mutating; an already-cancelled token makes
    /// this a no-op that returns `Err(Error::Cancelled)` without touching
    /// in-memory state. A rejected transition leaves state untouched too.
    pub async fn transition_to(
        &self,
        new_state: impl Into<String>,
        metadata: StateData,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.transition_inner(new_state, metadata, cancel, true).await
    }

    /// Apply a transition without consulting `is_valid_transition`.
    ///
    /// Reserved for administrative overrides that sit outside the FSM's own
    /// workflow graph: the shutdown coordinator's crash/clean paths force a
    /// parked agent straight to ERROR or DONE regardless of which state it
    /// was parked in, and `resume()` forces it back out of ERROR the same
    /// way (§4.E). Never call this from a concrete FSM's own `step` handlers.
    pub async fn force_transition(
        &self,
        new_state: impl Into<String>,
        metadata: StateData,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.transition_inner(new_state, metadata, cancel, false).await
    }

    async fn transition_inner(
        &self,
        new_state: impl Into<String>,
        metadata: StateData,
        cancel: &CancellationToken,
        validate: bool,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let new_state = new_state.into();
        let mut guard = self.inner.lock().await;
        let old_state = guard.current_state.clone();

        if validate && !(self.is_valid_transition)(&old_state, &new_state) {
            return Err(Error::InvalidTransition {
                from: old_state,
                to: new_state,
            });
        }

        let now = Utc::now();
        guard.transitions.push(StateTransition {
            from_state: old_state.clone(),
            to_state: new_state.clone(),
            timestamp: now,
            metadata: metadata.clone(),
        });

        guard.state_data.extend(metadata);
        guard
            .state_data
            .insert("previous_state".to_string(), json!(old_state));
        guard
            .state_data
            .insert("current_state".to_string(), json!(new_state));
        guard
            .state_data
            .insert("transition_at".to_string(), json!(now.to_rfc3339()));

        if old_state != new_state {
            guard.retry_count = 0;
        }
        guard.current_state = new_state;

        compact(&mut guard.transitions);

        let snapshot = snapshot_from(&self.agent_id, &guard);
        drop(guard);

        self.store.save(&self.agent_id, &snapshot).await
    }

    /// Persist the current in-memory state without a transition.
    pub async fn persist(&self) -> Result<()> {
        let guard = self.inner.lock().await;
        let snapshot = snapshot_from(&self.agent_id, &guard);
        self.store.save(&self.agent_id, &snapshot).await
    }

    /// Increment the retry counter, failing once `max_retries` would be
    /// exceeded. The counter is left unmutated on failure.
    pub async fn increment_retry(&self) -> Result<u32> {
        let mut guard = self.inner.lock().await;
        if guard.retry_count + 1 > self.max_retries {
            warn!(agent_id = %self.agent_id, max_retries = self.max_retries, "retry budget exhausted");
            return Err(Error::RetryExhausted(self.agent_id.clone()));
        }
        guard.retry_count += 1;
        Ok(guard.retry_count)
    }

    /// Truncate transition history to the newest `MAX_TRANSITION_HISTORY`
    /// entries, if it has grown past that.
    pub async fn compact_if_needed(&self) {
        let mut guard = self.inner.lock().await;
        compact(&mut guard.transitions);
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }
}

fn compact(transitions: &mut Vec<StateTransition>) {
    if transitions.len() > MAX_TRANSITION_HISTORY {
        let excess = transitions.len() - MAX_TRANSITION_HISTORY;
        transitions.drain(0..excess);
    }
}

fn snapshot_from(agent_id: &str, inner: &Inner) -> AgentSnapshot {
    let mut snapshot = AgentSnapshot::new(agent_id, &inner.current_state, inner.state_data.clone());
    snapshot.transitions = inner.transitions.clone();
    snapshot.retry_count = inner.retry_count;
    snapshot
}
