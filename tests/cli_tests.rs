//! Integration tests for the CLI interface.
//!
//! Tests the main entry point and command parsing logic, run as a real
//! subprocess so clap's own help/usage/validation text is exercised.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_cli_help_default() {
    let mut cmd = Command::cargo_bin("maestro").unwrap();
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = Command::cargo_bin("maestro").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("bootstrap-docker"));
}

#[test]
fn test_run_help() {
    let mut cmd = Command::cargo_bin("maestro").unwrap();
    cmd.arg("run")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--input"))
        .stdout(predicate::str::contains("--workdir"))
        .stdout(predicate::str::contains("--cleanup"));
}

#[test]
fn test_run_missing_input_fails() {
    let mut cmd = Command::cargo_bin("maestro").unwrap();
    cmd.arg("run")
        .arg("coder")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--input"));
}

#[test]
fn test_run_rejects_unknown_agent_kind() {
    let mut cmd = Command::cargo_bin("maestro").unwrap();
    cmd.arg("run")
        .arg("reviewer")
        .arg("--input")
        .arg("story.json")
        .assert()
        .failure();
}

#[test]
fn test_run_missing_input_file_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("maestro").unwrap();
    cmd.arg("run")
        .arg("coder")
        .arg("--input")
        .arg(dir.path().join("does-not-exist.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading input message"));
}

#[test]
fn test_bootstrap_docker_writes_dockerfile() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("maestro").unwrap();
    cmd.arg("bootstrap-docker")
        .arg("--path")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("detected backend:"));

    assert!(dir.path().join("Dockerfile").exists());
    assert!(dir.path().join(".dockerignore").exists());
}
