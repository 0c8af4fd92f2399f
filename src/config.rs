//! Application-wide configuration.
//!
//! Mirrors the split the original Go config package makes: a `ModelCfg`
//! covering LLM token budgets, and an `Agent` config covering retry/timeout
//! policy. Both deserialize from an optional TOML file and otherwise fall
//! back to sane defaults so the CLI works with zero configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Token-budget configuration for LLM calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelCfg {
    pub max_context_tokens: u32,
    pub max_reply_tokens: u32,
    pub compaction_buffer: u32,
}

impl Default for ModelCfg {
    fn default() -> Self {
        Self {
            max_context_tokens: 32_000,
            max_reply_tokens: 4_096,
            compaction_buffer: 1_000,
        }
    }
}

/// Retry/timeout policy shared by the state machine and shutdown coordinator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgentCfg {
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for AgentCfg {
    fn default() -> Self {
        Self {
            max_retries: 3,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Top-level application configuration, loaded from `maestro.toml` if present.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelCfg,
    #[serde(default)]
    pub agent: AgentCfg,
}

impl AppConfig {
    /// Load configuration from `path`, falling back to defaults if the file
    /// does not exist. A malformed file is a hard error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| anyhow::anyhow!("invalid config: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/maestro.toml")).unwrap();
        assert_eq!(config.model.max_context_tokens, 32_000);
        assert_eq!(config.agent.max_retries, 3);
    }

    #[test]
    fn loads_overrides_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maestro.toml");
        std::fs::write(
            &path,
            "[model]\nmax_context_tokens = 8000\nmax_reply_tokens = 2048\ncompaction_buffer = 256\n\n[agent]\nmax_retries = 5\nshutdown_timeout = \"30s\"\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.model.max_context_tokens, 8000);
        assert_eq!(config.agent.max_retries, 5);
        assert_eq!(config.agent.shutdown_timeout, Duration::from_secs(30));
    }
}
