//! The workspace manager contract (§6): an isolated working tree per agent.
//!
//! Grounded on the teacher's `worktree::WorktreeManager`, which shells out
//! to `git worktree add`/`git worktree remove` rather than driving `git2`
//! for plumbing it can express as two subprocess calls
//! (`worktree/builder.rs`).

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, warn};

#[async_trait]
pub trait WorkspaceManager: Send + Sync {
    /// Create an isolated working tree for `story_id` and return its path.
    /// `branch_pattern` is a `{story_id}`-templated branch name.
    async fn prepare(&self, story_id: &str, branch_pattern: &str) -> Result<PathBuf>;

    /// Tear down the working tree previously created for `story_id`.
    async fn teardown(&self, story_id: &str) -> Result<()>;
}

/// Creates one directory per story under a base directory. Sufficient for
/// standalone runs and tests that don't need real git isolation.
pub struct NullWorkspaceManager {
    base_dir: PathBuf,
}

impl NullWorkspaceManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, story_id: &str) -> PathBuf {
        self.base_dir.join(story_id)
    }
}

#[async_trait]
impl WorkspaceManager for NullWorkspaceManager {
    async fn prepare(&self, story_id: &str, _branch_pattern: &str) -> Result<PathBuf> {
        let path = self.path_for(story_id);
        fs::create_dir_all(&path).await?;
        Ok(path)
    }

    async fn teardown(&self, story_id: &str) -> Result<()> {
        let path = self.path_for(story_id);
        match fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Backs each agent's workspace with a real `git worktree`, checked out
/// from `repo_path` onto a fresh branch under `worktrees_dir`.
pub struct GitWorktreeManager {
    repo_path: PathBuf,
    worktrees_dir: PathBuf,
}

impl GitWorktreeManager {
    pub fn new(repo_path: impl Into<PathBuf>, worktrees_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            worktrees_dir: worktrees_dir.into(),
        }
    }

    fn path_for(&self, story_id: &str) -> PathBuf {
        self.worktrees_dir.join(story_id)
    }
}

#[async_trait]
impl WorkspaceManager for GitWorktreeManager {
    async fn prepare(&self, story_id: &str, branch_pattern: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.worktrees_dir).await?;
        let path = self.path_for(story_id);
        let branch = branch_pattern.replace("{story_id}", story_id);

        let output = Command::new("git")
            .args(["worktree", "add", "-b", &branch])
            .arg(&path)
            .current_dir(&self.repo_path)
            .output()
            .await
            .map_err(|e| Error::Other(format!("git worktree add failed to spawn: {e}")))?;

        if !output.status.success() {
            return Err(Error::Other(format!(
                "git worktree add failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        debug!(story_id, branch, path = %path.display(), "prepared git worktree");
        Ok(path)
    }

    async fn teardown(&self, story_id: &str) -> Result<()> {
        let path = self.path_for(story_id);
        if !path_exists(&path).await {
            return Ok(());
        }

        let output = Command::new("git")
            .args(["worktree", "remove", "--force"])
            .arg(&path)
            .current_dir(&self.repo_path)
            .output()
            .await
            .map_err(|e| Error::Other(format!("git worktree remove failed to spawn: {e}")))?;

        if !output.status.success() {
            warn!(
                story_id,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "git worktree remove reported an error"
            );
        }
        Ok(())
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}
