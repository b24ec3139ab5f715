use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn client_requires_a_subcommand() {
    Command::cargo_bin("duostore-client")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn server_rejects_an_unknown_mode() {
    Command::cargo_bin("duostore-server")
        .unwrap()
        .args(["--mode", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn binaries_report_a_version() {
    for bin in ["duostore-server", "duostore-registry", "duostore-client"] {
        Command::cargo_bin(bin)
            .unwrap()
            .arg("--version")
            .assert()
            .success();
    }
}
