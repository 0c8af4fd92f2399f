//! Durable key→JSON persistence for one agent snapshot per ID.
//!
//! Grounded on the Go original's `pkg/state/store.go` (atomic
//! `STATUS_<id>.json` files, first-run-is-success `Load`) and the teacher
//! crate's `FileCheckpointStorage` (`cook/execution/mapreduce/checkpoint/storage.rs`),
//! which writes through a `.tmp` sibling and renames into place.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Durable, per-agent-id JSON persistence.
///
/// Implementations hold no locks of their own: callers are responsible for
/// serializing writes to the same id (the base state machine does this via
/// its per-instance mutex).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Serialize `value` and write it atomically under `id`.
    async fn save<T: Serialize + Send + Sync>(&self, id: &str, value: &T) -> Result<()>;

    /// Load the value stored under `id`, or `Ok(None)` if nothing has been
    /// saved yet (first-run semantics, not an error).
    async fn load<T: DeserializeOwned + Send>(&self, id: &str) -> Result<Option<T>>;

    /// Idempotently remove any persisted value for `id`.
    async fn delete(&self, id: &str) -> Result<()>;

    /// List every agent id with a persisted snapshot.
    async fn list_agents(&self) -> Result<Vec<String>>;
}

/// File-backed implementation: one `STATUS_<id>.json` per agent under
/// `base_dir`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    base_dir: PathBuf,
}

impl FileStateStore {
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("STATUS_{id}.json"))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save<T: Serialize + Send + Sync>(&self, id: &str, value: &T) -> Result<()> {
        if id.is_empty() {
            return Err(Error::EmptyAgentId);
        }

        let json = serde_json::to_string_pretty(value)?;
        let final_path = self.path_for(id);
        let temp_path = final_path.with_extension("json.tmp");

        fs::write(&temp_path, json).await.map_err(|e| Error::Persistence {
            agent_id: id.to_string(),
            reason: e.to_string(),
        })?;
        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| Error::Persistence {
                agent_id: id.to_string(),
                reason: e.to_string(),
            })?;

        debug!(agent_id = id, path = %final_path.display(), "saved agent snapshot");
        Ok(())
    }

    async fn load<T: DeserializeOwned + Send>(&self, id: &str) -> Result<Option<T>> {
        if id.is_empty() {
            return Err(Error::EmptyAgentId);
        }

        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).await?;
        let value = serde_json::from_str(&contents)?;
        Ok(Some(value))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::EmptyAgentId);
        }

        let path = self.path_for(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_agents(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(id) = extract_agent_id(&entry.path()) {
                ids.push(id);
            }
        }

        Ok(ids)
    }
}

fn extract_agent_id(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let id = name.strip_prefix("STATUS_")?.strip_suffix(".json")?;
    Some(id.to_string())
}
