use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::cargo_bin("clip-tui")
        .expect("binary built")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::cargo_bin("clip-tui")
        .expect("binary built")
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("CLIP-TUI").and(predicate::str::contains("--version")),
        );
}
