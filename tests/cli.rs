// Shasplit backup engine.

//! Run the `shasplit` binary as a subprocess and check its externally
//! observable behavior: exit codes, stdout/stderr, and the repository it
//! leaves on disk. Grounded on conserve's own `tests/cli.rs` blackbox
//! harness (`Command::cargo_bin`, `assert_cmd`/`predicates`/`assert_fs`).

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

fn run_shasplit() -> Command {
    Command::cargo_bin("shasplit").expect("locate shasplit binary")
}

#[test]
fn no_args_is_a_usage_error() {
    run_shasplit().assert().failure();
}

#[test]
fn help_mentions_subcommands() {
    run_shasplit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("recover"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn add_status_recover_round_trip() {
    let repo = TempDir::new().unwrap();

    run_shasplit()
        .args(["--directory"])
        .arg(repo.path())
        .args(["add", "myvolume", "1"])
        .write_stdin("hello world")
        .assert()
        .success();

    run_shasplit()
        .args(["--directory"])
        .arg(repo.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("myvolume"))
        .stdout(predicate::str::contains("100%"));

    let output = run_shasplit()
        .args(["--directory"])
        .arg(repo.path())
        .args(["recover", "myvolume"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"hello world");
}

#[test]
fn check_reports_no_problems_after_a_clean_ingest() {
    let repo = TempDir::new().unwrap();
    run_shasplit()
        .args(["--directory"])
        .arg(repo.path())
        .args(["add", "v", "1"])
        .write_stdin("data")
        .assert()
        .success();

    run_shasplit()
        .args(["--directory"])
        .arg(repo.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("no problems found"));
}

#[test]
fn recover_of_unknown_name_fails() {
    let repo = TempDir::new().unwrap();
    repo.child(".data").create_dir_all().unwrap();
    run_shasplit()
        .args(["--directory"])
        .arg(repo.path())
        .args(["recover", "nosuchname"])
        .assert()
        .failure();
}

#[test]
fn retention_prunes_old_instances_across_invocations() {
    let repo = TempDir::new().unwrap();
    for payload in ["aaaa", "bbbb", "cccc"] {
        run_shasplit()
            .args(["--directory"])
            .arg(repo.path())
            .args(["--partsize", "4"])
            .args(["add", "d", "1"])
            .write_stdin(payload)
            .assert()
            .success();
    }

    let status_output = run_shasplit()
        .args(["--directory"])
        .arg(repo.path())
        .arg("status")
        .output()
        .unwrap();
    let stdout = String::from_utf8(status_output.stdout).unwrap();
    // Only the newest instance should remain with maxbackups=1.
    assert_eq!(stdout.matches("100%").count(), 1);
}
