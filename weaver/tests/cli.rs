//! CLI tests for `weaver init`, `weaver check-config` and `weaver solve` input handling.
//!
//! Spawns the weaver binary and verifies exit codes.

use std::fs;
use std::process::Command;

use weaver::exit_codes;
use weaver::io::config::{DEFAULT_CONFIG_FILE, load_config};

fn weaver() -> Command {
    Command::new(env!("CARGO_BIN_EXE_weaver"))
}

#[test]
fn init_writes_a_config_that_checks_clean() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = weaver()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("weaver init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join(DEFAULT_CONFIG_FILE)).expect("load");
    assert_eq!(cfg.run.max_debug_iterations, 3);

    let status = weaver()
        .current_dir(temp.path())
        .arg("check-config")
        .status()
        .expect("weaver check-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn init_keeps_an_existing_config_unless_forced() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join(DEFAULT_CONFIG_FILE);
    fs::write(&path, "[run]\nmax_debug_iterations = 7\n").expect("write");

    weaver()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("weaver init");
    assert_eq!(load_config(&path).expect("load").run.max_debug_iterations, 7);

    weaver()
        .current_dir(temp.path())
        .args(["init", "--force"])
        .status()
        .expect("weaver init --force");
    assert_eq!(load_config(&path).expect("load").run.max_debug_iterations, 3);
}

#[test]
fn invalid_config_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join(DEFAULT_CONFIG_FILE),
        "[run]\nsubmission_enabled = true\n",
    )
    .expect("write");

    let output = weaver()
        .current_dir(temp.path())
        .arg("check-config")
        .output()
        .expect("weaver check-config");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("judge.command"));
}

#[test]
fn solve_without_problem_file_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = weaver()
        .current_dir(temp.path())
        .args(["solve", "--problem", "missing.md"])
        .status()
        .expect("weaver solve");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn solve_rejects_overrides_that_break_the_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("two-sum.md"), "# Two Sum\n\nFind two numbers.\n").expect("write");

    let output = weaver()
        .current_dir(temp.path())
        .args(["solve", "--problem", "two-sum.md", "--benchmark"])
        .output()
        .expect("weaver solve");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("benchmark.command"));
}

#[test]
fn solve_rejects_a_run_timeout_beyond_the_cap() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("two-sum.md"), "# Two Sum\n\nFind two numbers.\n").expect("write");

    let output = weaver()
        .current_dir(temp.path())
        .args(["solve", "--problem", "two-sum.md", "--run-timeout-secs"])
        .arg(u64::MAX.to_string())
        .output()
        .expect("weaver solve");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("run.run_timeout_secs"));
}
