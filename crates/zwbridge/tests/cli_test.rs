//! Integration tests for the `zwbridge` CLI binary.
//!
//! These cover argument parsing, help output, shell completions, config
//! handling, and failure paths against a gateway nobody listens on.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Nothing listens on the discard port.
const DEAD_GATEWAY: &str = "ws://127.0.0.1:9";

/// Build a [`Command`] for the `zwbridge` binary with env isolation.
///
/// Clears all `ZWBRIDGE_*` env vars and points config and data
/// directories into `home` so tests never touch real configuration.
fn zwbridge_cmd(home: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("zwbridge");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("ZWBRIDGE_GATEWAY")
        .env_remove("ZWBRIDGE_CONFIG")
        .env_remove("ZWBRIDGE_OUTPUT")
        .env_remove("ZWBRIDGE_PORT")
        .env_remove("ZWBRIDGE_SCAN_TIMEOUT")
        .env_remove("ZWBRIDGE_SETTINGS_PATH")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = zwbridge_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = tempfile::tempdir().unwrap();
    zwbridge_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Z-Wave")
                .and(predicate::str::contains("connect"))
                .and(predicate::str::contains("add-device"))
                .and(predicate::str::contains("watch")),
        );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    zwbridge_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("zwbridge"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    zwbridge_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let home = tempfile::tempdir().unwrap();
    zwbridge_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Argument errors ─────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let home = tempfile::tempdir().unwrap();
    let output = zwbridge_cmd(home.path()).arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_poll_requires_mode() {
    let home = tempfile::tempdir().unwrap();
    zwbridge_cmd(home.path())
        .args(["poll", "5", "0x25"])
        .assert()
        .code(2);
}

#[test]
fn test_bad_class_id() {
    let home = tempfile::tempdir().unwrap();
    zwbridge_cmd(home.path())
        .args(["values", "5", "0xzz"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("0xzz"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("custom.toml");
    zwbridge_cmd(home.path())
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_defaults() {
    let home = tempfile::tempdir().unwrap();
    zwbridge_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ws://127.0.0.1:3000")
                .and(predicate::str::contains("write_config_interval_secs = 3600")),
        );
}

#[test]
fn test_config_show_reads_file() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("zwbridge.toml");
    std::fs::write(&path, "gateway = \"ws://hub.local:3000\"\nport = \"/dev/ttyACM0\"\n").unwrap();
    zwbridge_cmd(home.path())
        .args(["-o", "plain", "config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::diff("ws://hub.local:3000\n"));
}

#[test]
fn test_non_websocket_gateway_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    zwbridge_cmd(home.path())
        .args(["config", "show", "--gateway", "http://hub.local:3000"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("gateway"));
}

// ── Gateway-bound commands ──────────────────────────────────────────

#[test]
fn test_nodes_without_port() {
    let home = tempfile::tempdir().unwrap();
    zwbridge_cmd(home.path())
        .args(["nodes", "--gateway", DEAD_GATEWAY, "--scan-timeout", "5"])
        .env("ZWBRIDGE_SETTINGS_PATH", home.path().join("state.toml"))
        .assert()
        .code(7)
        .stderr(predicate::str::contains("No serial port configured"));
}

#[test]
fn test_connect_persists_port_even_when_unreachable() {
    let home = tempfile::tempdir().unwrap();
    let state = home.path().join("state.toml");

    let output = zwbridge_cmd(home.path())
        .args(["connect", "/dev/ttyUSB9", "--gateway", DEAD_GATEWAY, "--scan-timeout", "3"])
        .env("ZWBRIDGE_SETTINGS_PATH", &state)
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stored = std::fs::read_to_string(&state).unwrap();
    assert!(stored.contains("/dev/ttyUSB9"), "state file:\n{stored}");
}
