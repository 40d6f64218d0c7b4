//! Integration tests for the `netpulse` binary.
//!
//! Argument parsing, help output, completions, config file handling and a
//! loopback probe. Nothing here needs a LAN or an RTSP device.
#![allow(clippy::unwrap_used)]

use std::net::TcpListener;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `netpulse` binary with env isolation.
///
/// Clears `NETPULSE_*` variables that tests rely on and points config
/// directories at a nonexistent path so tests never touch real config.
fn netpulse_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("netpulse");
    cmd.env("HOME", "/tmp/netpulse-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/netpulse-cli-test-nonexistent")
        .env_remove("NETPULSE_CONFIG")
        .env_remove("NETPULSE_OUTPUT")
        .env_remove("NETPULSE_SCAN__WORKERS")
        .env_remove("NETPULSE_PROBE__REFUSED_IS_ALIVE")
        .env_remove("RUST_LOG");
    cmd
}

fn with_config(path: &Path) -> assert_cmd::Command {
    let mut cmd = netpulse_cmd();
    cmd.arg("--config").arg(path);
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
    let output = netpulse_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    netpulse_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("liveness")
            .and(predicate::str::contains("probe"))
            .and(predicate::str::contains("discover"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    netpulse_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("netpulse"));
}

#[test]
fn test_invalid_subcommand() {
    let output = netpulse_cmd().arg("frobnicate").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    netpulse_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    netpulse_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("netpulse"));
}

// ── Argument validation ─────────────────────────────────────────────

#[test]
fn test_probe_rejects_bad_address() {
    let output = netpulse_cmd()
        .args(["probe", "not-an-address"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_probe_requires_an_address() {
    let output = netpulse_cmd().arg("probe").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_watch_without_targets_is_usage_error() {
    let output = netpulse_cmd().arg("watch").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("--all"), "Expected a hint in output:\n{text}");
}

#[test]
fn test_watch_rejects_bad_duration() {
    let output = netpulse_cmd()
        .args(["watch", "127.0.0.1", "--for", "soon"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_discover_rejects_bad_subnet() {
    let output = netpulse_cmd()
        .args(["discover", "--subnet", "10.0.0.0/16"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_discover_rejects_port_zero() {
    let output = netpulse_cmd()
        .args(["discover", "--subnet", "10.0.0", "--port", "0"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    with_config(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_without_file_prints_defaults() {
    let dir = tempfile::tempdir().unwrap();
    with_config(&dir.path().join("missing.toml"))
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[monitor]")
                .and(predicate::str::contains("offline_threshold_secs = 10"))
                .and(predicate::str::contains("port = 554")),
        );
}

#[test]
fn test_config_init_then_refuse_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    with_config(&path).args(["config", "init"]).assert().success();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[scan]"), "unexpected file:\n{written}");

    let output = with_config(&path)
        .args(["config", "init"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("already exists"));

    with_config(&path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_show_reports_invalid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[scan]\nport = 0\n").unwrap();

    let output = with_config(&path)
        .args(["config", "show"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("scan.port"));
}

#[test]
fn test_env_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = with_config(&dir.path().join("missing.toml"))
        .env("NETPULSE_SCAN__WORKERS", "0")
        .args(["config", "show"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("scan.workers"));
}

// ── Probe over loopback ─────────────────────────────────────────────

#[test]
fn test_probe_open_port_is_online() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port().to_string();
    let dir = tempfile::tempdir().unwrap();

    with_config(&dir.path().join("missing.toml"))
        .args(["probe", "127.0.0.1", "--no-icmp", "--port", &port])
        .args(["-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("127.0.0.1 online"));
}

#[test]
fn test_probe_unreachable_exits_with_network_code() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port().to_string()
    };
    let dir = tempfile::tempdir().unwrap();

    let output = with_config(&dir.path().join("missing.toml"))
        .env("NETPULSE_PROBE__REFUSED_IS_ALIVE", "false")
        .args(["probe", "127.0.0.1", "--no-icmp", "--fast", "--port", &port])
        .args(["-o", "json-compact"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let reports: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(reports[0]["online"], serde_json::Value::Bool(false));
    assert_eq!(reports[0]["method"], serde_json::Value::Null);
}
