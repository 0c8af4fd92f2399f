//! The LLM client contract (§6).
//!
//! Deliberately thin: request/response content is an opaque string and the
//! coder FSM interprets it by convention (see [`parse_llm_output`] in
//! `coder::fsm`). Nothing here prescribes a prompt format or wire protocol,
//! that is explicitly out of scope (§1 Non-goals).

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub tokens_used: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionChunk {
    pub content: String,
    pub done: bool,
}

/// A single opaque call out to whatever drives the agent's reasoning.
/// `complete` is the only suspension point the FSM ever awaits directly
/// (§5); `stream` is optional and defaults to "unsupported" for clients that
/// only implement the blocking form.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse>;

    fn stream(
        &self,
        _cancel: &CancellationToken,
        _request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<CompletionChunk>>> {
        Err(Error::Other("streaming not supported by this client".into()))
    }
}

/// Deterministic stand-in used by tests and by the CLI's standalone
/// auto-approval loop when no live credentials are configured. Recognizes
/// exactly the conventions the coder FSM relies on:
///
/// - a prompt whose task content contains "help understanding" or "unclear"
///   triggers a `NEEDS_CLARIFICATION:` response the first time only; every
///   later call, across the lifetime of this client, answers plainly;
/// - a prompt containing "over_budget" returns `Err(BudgetExceeded)`, for
///   exercising the BUDGET_REVIEW gate without a real token counter;
/// - everything else returns a canned success string naming the phase.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    asked_for_clarification: AtomicBool,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let prompt = request.prompt.to_lowercase();
        if prompt.contains("over_budget") {
            return Err(Error::BudgetExceeded);
        }
        let needs_clarification = prompt.contains("help understanding") || prompt.contains("unclear");
        let content = if needs_clarification
            && !self.asked_for_clarification.swap(true, Ordering::SeqCst)
        {
            "NEEDS_CLARIFICATION: the requirement does not specify the response schema"
                .to_string()
        } else if prompt.starts_with("plan:") {
            "1. add the route\n2. wire the handler\n3. add a test".to_string()
        } else {
            "ok".to_string()
        };

        Ok(CompletionResponse {
            content,
            tokens_used: request.max_tokens.min(256),
        })
    }
}

/// Shells out to an external `claude`-style CLI binary, mirroring the
/// teacher's `ClaudeRunner` (`subprocess/claude.rs`): this crate never
/// speaks a provider's wire protocol directly, it drives a subprocess and
/// reads its stdout.
pub struct ProcessLlmClient {
    binary: String,
}

impl ProcessLlmClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl LlmClient for ProcessLlmClient {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = Command::new(&self.binary).arg("-p").arg(&request.prompt).output() => result,
        };

        let output = output.map_err(|e| Error::Other(format!("{} failed: {e}", self.binary)))?;
        if !output.status.success() {
            return Err(Error::Other(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let content = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(CompletionResponse {
            content,
            tokens_used: request.max_tokens,
        })
    }
}
