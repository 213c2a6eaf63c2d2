//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

mod common;

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the fedround-node binary
fn node_cmd() -> Command {
    Command::cargo_bin("fedround-node").unwrap()
}

/// Single node with no peers on an ephemeral port, writing into `data_dir`
fn lone_node_config(data_dir: &Path, policy: &str) -> String {
    format!(
        r#"
[node]
name = "solo"
listen_addr = "127.0.0.1:0"

[round]
rounds = 1
round_timeout_ms = 50
cooldown_ms = 0
timeout_policy = "{policy}"

[logging]
level = "warn"

[storage]
data_dir = "{dir}"
save_snapshots = true
"#,
        policy = policy,
        dir = data_dir.display()
    )
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    node_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("federated"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("version"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    node_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fedround-node"))
        .stdout(predicate::str::contains("Protocol:"))
        .stdout(predicate::str::contains("Git Hash"));
}

#[test]
fn test_short_version_flag() {
    node_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fedround-node"));
}

#[test]
fn test_run_help_lists_rounds_override() {
    node_cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--rounds"))
        .stdout(predicate::str::contains("--config"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_fixture() {
    node_cmd()
        .args(["config", "show", "--config"])
        .arg(common::valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("[node]"))
        .stdout(predicate::str::contains("[[peers]]"))
        .stdout(predicate::str::contains("[round]"))
        .stdout(predicate::str::contains("[sender]"))
        .stdout(predicate::str::contains("timeout_policy = \"retry_same_round\""))
        .stdout(predicate::str::contains("backoff = \"exponential\""));
}

#[test]
fn test_config_validate_fixture() {
    node_cmd()
        .args(["config", "validate", "--config"])
        .arg(common::valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_rejects_duplicate_peers() {
    node_cmd()
        .args(["config", "validate", "--config"])
        .arg(common::invalid_config_fixture())
        .assert()
        .code(10)
        .stderr(predicate::str::contains("E102"))
        .stderr(predicate::str::contains("duplicate peer name"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    node_cmd()
        .args(["config", "validate", "--config", "/nonexistent/path/node.toml"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("E100"));
}

#[test]
fn test_config_init_writes_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("node.toml");

    node_cmd()
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration written to"));

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("[round]"));

    // Generated file validates as-is
    node_cmd()
        .args(["config", "validate", "--config"])
        .arg(&path)
        .assert()
        .success();

    // Refuses to overwrite without --force
    node_cmd()
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    node_cmd()
        .args(["config", "init", "--force", "--path"])
        .arg(&path)
        .assert()
        .success();
}

// ─────────────────────────────────────────────────────────────────
// Run Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_run_lone_node_advances_anyway() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("node.toml");
    fs::write(&config_path, lone_node_config(temp_dir.path(), "advance_anyway")).unwrap();

    node_cmd()
        .args(["run", "--rounds", "2", "--config"])
        .arg(&config_path)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success();

    let snapshots = temp_dir.path().join("snapshots");
    for name in [
        "round1_local.json",
        "round1_global.json",
        "round2_local.json",
        "round2_global.json",
    ] {
        assert!(snapshots.join(name).exists(), "missing {}", name);
    }
}

#[test]
fn test_run_lone_node_aborts_without_quorum() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("node.toml");
    fs::write(&config_path, lone_node_config(temp_dir.path(), "abort")).unwrap();

    node_cmd()
        .args(["run", "--config"])
        .arg(&config_path)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .code(50)
        .stderr(predicate::str::contains("E500"));

    // The local snapshot is written, the global one never is
    let snapshots = temp_dir.path().join("snapshots");
    assert!(snapshots.join("round1_local.json").exists());
    assert!(!snapshots.join("round1_global.json").exists());
}

#[test]
fn test_run_rejects_zero_rounds_override() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("node.toml");
    fs::write(&config_path, lone_node_config(temp_dir.path(), "abort")).unwrap();

    node_cmd()
        .args(["run", "--rounds", "0", "--config"])
        .arg(&config_path)
        .assert()
        .code(10)
        .stderr(predicate::str::contains("must be at least 1"));
}
