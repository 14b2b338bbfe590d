//! Smoke test for the thin `strace-compare` dev-harness binary (SPEC_FULL.md
//! §0): parses two trace files from disk and prints a JSON scoring result.

use assert_cmd::Command;
use predicates::str::contains;
use std::io::Write;
use tempfile::NamedTempFile;

fn trace_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn compares_two_identical_traces_with_a_perfect_score() {
    let source = trace_file(r#"1 openat(AT_FDCWD, "/tmp/x", O_RDONLY) = 3"#);
    let target = trace_file(r#"1 openat(AT_FDCWD, "/tmp/x", O_RDONLY) = 3"#);

    Command::cargo_bin("strace-compare")
        .unwrap()
        .arg(source.path())
        .arg(target.path())
        .assert()
        .success()
        .stdout(contains("\"score\""));
}

#[test]
fn reports_an_error_for_a_missing_trace_file() {
    Command::cargo_bin("strace-compare")
        .unwrap()
        .arg("/nonexistent/source.log")
        .arg("/nonexistent/target.log")
        .assert()
        .failure();
}
