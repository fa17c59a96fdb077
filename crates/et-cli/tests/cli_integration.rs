//! CLI integration tests
//!
//! Tests the ecs-tunnel CLI using assert_cmd. None of these reach AWS:
//! forwards are checked before any client is built.

use assert_cmd::Command;
use predicates::prelude::*;

fn ecs_tunnel() -> Command {
    Command::cargo_bin("ecs-tunnel")
        .expect("Failed to locate ecs-tunnel binary - ensure it's built before running tests")
}

#[test]
fn test_cli_help() {
    ecs_tunnel()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ecs-tunnel"))
        .stdout(predicate::str::contains("--cluster"))
        .stdout(predicate::str::contains("LOCAL_PORT:[REMOTE_ADDR:]REMOTE_PORT"))
        .stdout(predicate::str::contains("--http-proxy"));
}

#[test]
fn test_cli_version() {
    ecs_tunnel()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ecs-tunnel"));
}

#[test]
fn test_cli_short_version() {
    ecs_tunnel()
        .arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_requires_cluster_and_task() {
    ecs_tunnel()
        .args(["-L", "8080:80"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--cluster"));
}

#[test]
fn test_cli_no_forwards() {
    ecs_tunnel()
        .args(["-c", "cluster", "-t", "task"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("ERROR: no forwards (-L/-H) given"));
}

#[test]
fn test_cli_invalid_forward() {
    ecs_tunnel()
        .args(["-c", "cluster", "-t", "task", "-L", "8080"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Invalid port forward syntax"));
}

#[test]
fn test_cli_invalid_forward_after_valid_one() {
    ecs_tunnel()
        .args([
            "-c", "cluster", "-t", "task", "-L", "8080:80", "-L", "5432:bad host:5432",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Invalid port forward syntax"))
        .stdout(predicate::str::contains("Setup tunnel").not());
}

#[test]
fn test_cli_rejects_non_numeric_proxy_port() {
    ecs_tunnel()
        .args(["-c", "cluster", "-t", "task", "-H", "proxy"])
        .assert()
        .failure();
}

#[test]
fn test_cli_missing_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");

    ecs_tunnel()
        .args(["-c", "cluster", "-t", "task", "-L", "8080:80", "--config"])
        .arg(&missing)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_cli_invalid_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[ports]\nmin = 5000\nmax = 4000\n").unwrap();

    ecs_tunnel()
        .args(["-c", "cluster", "-t", "task", "-H", "3128", "--config"])
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load configuration"));
}
