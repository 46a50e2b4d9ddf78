//! CLI tests for `spikeguard config` and argument errors.
//!
//! These run the built binary; every invocation passes an explicit
//! `--config` so the host's own files never leak in.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn spikeguard() -> Command {
    let mut cmd = Command::cargo_bin("spikeguard").expect("spikeguard binary should exist");
    cmd.env_remove("SPIKEGUARD_CONFIG")
        .env_remove("SPIKEGUARD_CONFIG_DIR")
        .env("SPIKEGUARD_LOG", "error");
    cmd
}

#[test]
fn config_prints_effective_settings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("spikeguard.toml");
    fs::write(&path, "[predictor]\nalpha = 45\n").unwrap();

    spikeguard()
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha = 45"))
        .stdout(predicate::str::contains("cpu_threshold = 2000"))
        .stdout(predicate::str::contains("protected = ["));
}

#[test]
fn invalid_value_exits_with_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("spikeguard.toml");
    fs::write(&path, "[predictor]\nalpha = 0\n").unwrap();

    spikeguard()
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .code(11);
}

#[test]
fn missing_config_file_exits_with_config_error() {
    let dir = TempDir::new().unwrap();
    spikeguard()
        .args(["config", "--config"])
        .arg(dir.path().join("absent.toml"))
        .assert()
        .code(11);
}

#[test]
fn unknown_metric_is_rejected() {
    spikeguard()
        .args(["sample", "--metric", "latency"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("latency"));
}

#[test]
fn help_is_not_an_argument_error() {
    spikeguard()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sample"));
}
