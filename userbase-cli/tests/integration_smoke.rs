//! Smoke tests to verify command wiring

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("userbase").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("migrate"));
}

#[test]
fn test_serve_help() {
    let mut cmd = Command::cargo_bin("userbase").unwrap();
    cmd.arg("serve").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--on-reconnect-failure"))
        .stdout(predicate::str::contains("--connect-attempts"));
}

#[test]
fn test_serve_requires_database_url() {
    let mut cmd = Command::cargo_bin("userbase").unwrap();
    cmd.env_remove("DATABASE_URL")
        .env_remove("REDIS_ADDR")
        .current_dir(std::env::temp_dir())
        .arg("serve");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--database-url"));
}

#[test]
fn test_unreachable_database_is_fatal() {
    let mut cmd = Command::cargo_bin("userbase").unwrap();
    cmd.current_dir(std::env::temp_dir())
        .env("RUST_LOG", "off")
        .args([
            "serve",
            "--skip-migrations",
            "--database-url",
            "postgres://userbase@127.0.0.1:1/userbase",
            "--redis-addr",
            "127.0.0.1:1",
            "--connect-attempts",
            "1",
            "--connect-delay-secs",
            "0",
            "--connect-timeout-secs",
            "1",
        ]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Initial database connection failed"));
}
