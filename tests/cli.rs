//! Smoke tests -- verify the binary runs and the subcommands exist.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("kiln")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Single-machine build runner with durable build records",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("kiln")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("kiln"));
}

#[test]
fn test_build_subcommand_exists() {
    Command::cargo_bin("kiln")
        .unwrap()
        .args(["build", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--dry-run"));
}

#[test]
fn test_list_subcommand_exists() {
    Command::cargo_bin("kiln")
        .unwrap()
        .args(["list", "--help"])
        .assert()
        .success();
}

#[test]
fn test_print_subcommand_exists() {
    Command::cargo_bin("kiln")
        .unwrap()
        .args(["print", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("build-dir"));
}

#[test]
fn test_report_subcommand_exists() {
    Command::cargo_bin("kiln")
        .unwrap()
        .args(["report", "--help"])
        .assert()
        .success();
}

#[test]
fn test_build_requires_arguments() {
    Command::cargo_bin("kiln")
        .unwrap()
        .arg("build")
        .assert()
        .failure();
}
