//! Binary-level tests for the `wsgate` command line.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use wsgate::application::status::StatusWriter;
use wsgate::testkit::config;

fn wsgate(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("wsgate").unwrap();
    cmd.current_dir(dir).env_remove("WSGATE_JWT_SECRET").env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("gw.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn check_config_accepts_valid_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[pool]\nmax_connections = 42\n[auth]\njwt_secret = \"s\"\n");

    wsgate(dir.path())
        .args(["check-config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("42"));
}

#[test]
fn check_config_rejects_invalid_value() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[pool]\noverload_admission_ratio = 1.5\n");

    wsgate(dir.path())
        .args(["check-config", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("overload_admission_ratio"));
}

#[test]
fn check_config_json_reports_missing_secret() {
    let dir = TempDir::new().unwrap();

    let output = wsgate(dir.path())
        .args(["check-config", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["valid"], true);
    assert_eq!(report["secret_present"], false);
    assert_eq!(report["config"], "(defaults)");
    assert!(report["effective"]["auth"].get("jwt_secret").is_none());
}

#[test]
fn serve_refuses_to_start_without_secret() {
    let dir = TempDir::new().unwrap();

    wsgate(dir.path())
        .args(["serve", "--bind", "127.0.0.1:0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("jwt_secret"));
}

#[test]
fn tune_json_lists_findings() {
    let dir = TempDir::new().unwrap();

    let output = wsgate(dir.path()).args(["tune", "--json"]).output().unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(report["command"], "tune");
    assert_eq!(report["report"]["target_connections"], 1000);
    assert!(!report["report"]["findings"].as_array().unwrap().is_empty());
}

#[test]
fn status_reads_written_snapshot() {
    let dir = TempDir::new().unwrap();
    let status_path = dir.path().join("status.json");
    let pool = config::healthy_pool(config::pool(7));
    StatusWriter::new(&status_path, "127.0.0.1:8765")
        .write(&pool.stats())
        .unwrap();

    let output = wsgate(dir.path())
        .args(["status", "--json", "--file"])
        .arg(&status_path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "ok");
    assert_eq!(report["snapshot"]["bind_address"], "127.0.0.1:8765");
    assert_eq!(report["snapshot"]["stats"]["config"]["max_connections"], 7);
}

#[test]
fn status_without_file_hints_at_configuration() {
    let dir = TempDir::new().unwrap();

    wsgate(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("server.status_file"));
}
