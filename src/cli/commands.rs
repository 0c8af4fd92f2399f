//! Implementations of the two standalone-CLI commands (§6).

use crate::cli::args::AgentKind;
use crate::coder::{CoderFsm, NullWorkspaceManager, ProcessLlmClient, WorkspaceManager};
use crate::proto::{AgentMsg, MsgType};
use crate::state::FileStateStore;
use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Bounded exactly like the Go CLI's `processWithApprovals`: enough
/// iterations for a full plan/code/test/review cycle with a couple of
/// retries, without risking an unbounded loop in a headless run.
const MAX_STANDALONE_ITERATIONS: u32 = 10;

/// `run <coder|architect> --input <file> [--workdir <dir>] [--cleanup]`
pub async fn run_agent(
    agent: AgentKind,
    input: PathBuf,
    workdir: Option<PathBuf>,
    cleanup: bool,
) -> Result<()> {
    match agent {
        AgentKind::Coder => run_coder(input, workdir, cleanup).await,
        AgentKind::Architect => {
            // The Go original never implemented a standalone architect path
            // either (`cmd/agentctl/main.go`): orchestrating multiple coders
            // is the architect's job, and that coordination logic is out of
            // this crate's scope (§1 Non-goals).
            bail!("architect standalone mode is not implemented; run a coder directly")
        }
    }
}

async fn run_coder(input: PathBuf, workdir: Option<PathBuf>, cleanup: bool) -> Result<()> {
    let contents = std::fs::read_to_string(&input)
        .with_context(|| format!("reading input message {}", input.display()))?;
    let msg: AgentMsg = serde_json::from_str(&contents)
        .with_context(|| format!("parsing input message {}", input.display()))?;

    if msg.msg_type != MsgType::Story {
        bail!("input message must be of type STORY, got {:?}", msg.msg_type);
    }

    if std::env::var("ANTHROPIC_API_KEY").is_err() {
        bail!(
            "ANTHROPIC_API_KEY is not set; live mode requires it (mocks are test-only, see coder::llm::MockLlmClient)"
        );
    }

    let workdir = workdir.unwrap_or(std::env::current_dir()?);
    std::fs::create_dir_all(&workdir)
        .with_context(|| format!("creating working directory {}", workdir.display()))?;

    let config = crate::config::AppConfig::load(&workdir.join("maestro.toml"))?;

    let story_id = msg
        .get_payload("story_id")
        .and_then(|v| v.as_str())
        .unwrap_or(msg.to.as_str())
        .to_string();
    let task_content = msg.payload_str("content").unwrap_or("").to_string();
    // The envelope's `to` field is normally the architect-assigned agent id;
    // a message with no addressee (e.g. a hand-written story fed directly to
    // `run`) still needs a stable id to key its snapshot file under.
    let agent_id = if msg.to.trim().is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        msg.to.clone()
    };

    let store = Arc::new(FileStateStore::new(workdir.join(".maestro")).await?);
    let workspace = Arc::new(NullWorkspaceManager::new(workdir.join("workspaces")));
    let build = crate::coder::build::detect_backend(&workdir).await.into();
    let llm: Arc<dyn crate::coder::LlmClient> = Arc::new(ProcessLlmClient::new("claude"));

    let fsm = CoderFsm::new(
        agent_id.clone(),
        config.agent.max_retries,
        config.model.max_reply_tokens,
        store,
        llm,
        workspace.clone(),
        build,
    );
    fsm.initialize().await?;

    let cancel = CancellationToken::new();
    if fsm.current_state().await == crate::coder::AgentState::Waiting {
        fsm.start_task(&story_id, &task_content, &cancel).await?;
    } else {
        info!(agent_id = %agent_id, "resuming from persisted state");
    }

    let final_state = fsm
        .run_with_auto_approvals(&cancel, MAX_STANDALONE_ITERATIONS)
        .await?;

    let mut result = AgentMsg::new(MsgType::Result, agent_id.clone(), msg.from.clone());
    result.set_payload("status", final_state.as_str());
    println!(
        "{}",
        serde_json::to_string(&result).map_err(|e| anyhow!("serializing result message: {e}"))?
    );

    if cleanup {
        workspace.teardown(&story_id).await?;
    }

    if final_state != crate::coder::AgentState::Done {
        bail!("agent finished in {final_state}, not DONE");
    }
    Ok(())
}

/// `bootstrap-docker [--path <dir>]`
pub async fn bootstrap_docker(path: Option<PathBuf>) -> Result<()> {
    let dir = path.unwrap_or(std::env::current_dir()?);
    let backend = crate::coder::build::detect_backend(&dir).await;

    println!("detected backend: {}", backend.name());

    let dockerfile = dockerfile_template(backend.name());
    let dockerfile_path = dir.join("Dockerfile");
    std::fs::write(&dockerfile_path, dockerfile)
        .with_context(|| format!("writing {}", dockerfile_path.display()))?;
    println!("wrote {}", dockerfile_path.display());

    let dockerignore_path = dir.join(".dockerignore");
    std::fs::write(&dockerignore_path, dockerignore_template(backend.name()))
        .with_context(|| format!("writing {}", dockerignore_path.display()))?;
    println!("wrote {}", dockerignore_path.display());

    Ok(())
}

fn dockerfile_template(backend: &str) -> &'static str {
    match backend {
        "cargo" => {
            "FROM rust:1-slim AS build\nWORKDIR /app\nCOPY . .\nRUN cargo build --release\n\nFROM debian:stable-slim\nCOPY --from=build /app/target/release /usr/local/bin\nCMD [\"/usr/local/bin/app\"]\n"
        }
        "npm" => {
            "FROM node:20-slim AS build\nWORKDIR /app\nCOPY package*.json ./\nRUN npm ci\nCOPY . .\nRUN npm run build --if-present\n\nFROM node:20-slim\nWORKDIR /app\nCOPY --from=build /app .\nCMD [\"npm\", \"start\"]\n"
        }
        _ => "FROM debian:stable-slim\nWORKDIR /app\nCOPY . .\nCMD [\"true\"]\n",
    }
}

fn dockerignore_template(backend: &str) -> &'static str {
    match backend {
        "cargo" => "target\n.git\n",
        "npm" => "node_modules\n.git\n",
        _ => ".git\n",
    }
}
