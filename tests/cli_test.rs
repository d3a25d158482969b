//! Integration tests for the `support-desk` binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn desk(dir: &Path) -> Command {
    let config = dir.join("desk.yaml");
    std::fs::write(&config, "operators: [900]\nsweeper:\n  enabled: false\n").unwrap();

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("support-desk").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("SUPPORT_DESK_CONFIG")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(dir.join("desk.db"))
        .arg("--no-color");
    cmd
}

#[test]
#[allow(deprecated)]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("support-desk").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("sweep"));
}

#[test]
fn test_init_then_empty_list() {
    let temp_dir = TempDir::new().unwrap();

    desk(temp_dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized database"));
    assert!(temp_dir.path().join("desk.db").exists());

    desk(temp_dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No tickets found"));

    desk(temp_dir.path())
        .args(["--json", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_serve_handles_piped_intents() {
    let temp_dir = TempDir::new().unwrap();
    let input = concat!(
        r#"{"actor_id": 100, "kind": "create_ticket", "category": "internet/slow", "description": "Slow pages"}"#,
        "\n",
        "not json\n",
    );

    desk(temp_dir.path())
        .args(["serve", "--no-sweeper"])
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"created\""))
        .stdout(predicate::str::contains("\"ok\":false"));

    desk(temp_dir.path())
        .args(["list", "--user", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("internet/slow"));
}

#[test]
fn test_serve_survives_invalid_utf8_line() {
    let temp_dir = TempDir::new().unwrap();
    let mut input = b"\xff\xfe bad line\n".to_vec();
    input.extend_from_slice(
        br#"{"actor_id": 100, "kind": "create_ticket", "category": "internet/slow", "description": "Slow pages"}"#,
    );
    input.push(b'\n');

    desk(temp_dir.path())
        .args(["serve", "--no-sweeper"])
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ok\":false"))
        .stdout(predicate::str::contains("\"created\""));

    desk(temp_dir.path())
        .args(["list", "--user", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("internet/slow"));
}

#[test]
fn test_show_unknown_ticket_fails() {
    let temp_dir = TempDir::new().unwrap();
    desk(temp_dir.path()).arg("init").assert().success();

    desk(temp_dir.path())
        .args(["show", "ZZZZZZZZ"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("was not found"));
}

#[test]
fn test_invalid_config_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("bad.yaml");
    std::fs::write(&config, "retry:\n  max_attempts: 0\n").unwrap();

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("support-desk").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(temp_dir.path().join("desk.db"))
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_attempts"));
}
