//! The build/test backend contract (§6). Backends are interchangeable;
//! `detect_backend` picks the first whose `detect` returns true, falling
//! back to [`NullBackend`].

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub passed: bool,
    pub output: String,
}

#[async_trait]
pub trait BuildBackend: Send + Sync {
    async fn detect(&self, dir: &Path) -> bool;
    fn name(&self) -> &str;
    async fn run_tests(&self, cancel: &CancellationToken, dir: &Path) -> Result<TestOutcome>;
}

/// Succeeds trivially; used when no recognized project layout is present
/// and for tests that don't care about a real build backend.
#[derive(Debug, Default)]
pub struct NullBackend;

#[async_trait]
impl BuildBackend for NullBackend {
    async fn detect(&self, _dir: &Path) -> bool {
        true
    }

    fn name(&self) -> &str {
        "null"
    }

    async fn run_tests(&self, _cancel: &CancellationToken, _dir: &Path) -> Result<TestOutcome> {
        Ok(TestOutcome {
            passed: true,
            output: String::new(),
        })
    }
}

#[derive(Debug, Default)]
pub struct CargoBackend;

#[async_trait]
impl BuildBackend for CargoBackend {
    async fn detect(&self, dir: &Path) -> bool {
        dir.join("Cargo.toml").exists()
    }

    fn name(&self) -> &str {
        "cargo"
    }

    async fn run_tests(&self, cancel: &CancellationToken, dir: &Path) -> Result<TestOutcome> {
        run_command(cancel, "cargo", &["test", "--quiet"], dir).await
    }
}

#[derive(Debug, Default)]
pub struct NpmBackend;

#[async_trait]
impl BuildBackend for NpmBackend {
    async fn detect(&self, dir: &Path) -> bool {
        dir.join("package.json").exists()
    }

    fn name(&self) -> &str {
        "npm"
    }

    async fn run_tests(&self, cancel: &CancellationToken, dir: &Path) -> Result<TestOutcome> {
        run_command(cancel, "npm", &["test"], dir).await
    }
}

async fn run_command(
    cancel: &CancellationToken,
    program: &str,
    args: &[&str],
    dir: &Path,
) -> Result<TestOutcome> {
    use crate::error::Error;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        result = Command::new(program).args(args).current_dir(dir).output() => result,
    };

    let output = output.map_err(|e| Error::Other(format!("{program} failed: {e}")))?;
    let mut output_text = String::from_utf8_lossy(&output.stdout).to_string();
    output_text.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(TestOutcome {
        passed: output.status.success(),
        output: output_text,
    })
}

/// Returns the first backend that recognizes `dir`, or [`NullBackend`].
pub async fn detect_backend(dir: &Path) -> Box<dyn BuildBackend> {
    let cargo = CargoBackend;
    if cargo.detect(dir).await {
        return Box::new(cargo);
    }
    let npm = NpmBackend;
    if npm.detect(dir).await {
        return Box::new(npm);
    }
    Box::new(NullBackend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_backend_always_passes() {
        let cancel = CancellationToken::new();
        let outcome = NullBackend
            .run_tests(&cancel, Path::new("/nonexistent"))
            .await
            .unwrap();
        assert!(outcome.passed);
    }

    #[tokio::test]
    async fn detect_falls_back_to_null_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = detect_backend(dir.path()).await;
        assert_eq!(backend.name(), "null");
    }

    #[tokio::test]
    async fn detect_recognizes_cargo_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname=\"x\"").unwrap();
        let backend = detect_backend(dir.path()).await;
        assert_eq!(backend.name(), "cargo");
    }
}
