//! CLI smoke tests for the docmark binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[test]
fn convert_writes_markdown_to_stdout() {
    let mut file = tempfile::Builder::new()
        .suffix(".txt")
        .tempfile()
        .unwrap();
    write!(file, "# Title\n\n\n\nBody text.\n").unwrap();

    Command::cargo_bin("docmark")
        .unwrap()
        .arg("convert")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("# Title\n\nBody text."));
}

#[test]
fn convert_writes_to_output_file() {
    let mut input = tempfile::Builder::new()
        .suffix(".md")
        .tempfile()
        .unwrap();
    write!(input, "hello\n").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.md");

    Command::cargo_bin("docmark")
        .unwrap()
        .arg("convert")
        .arg(input.path())
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    assert_eq!(std::fs::read_to_string(&output).unwrap(), "hello");
}

#[test]
fn unsupported_extension_is_an_error() {
    let mut file = tempfile::Builder::new()
        .suffix(".exe")
        .tempfile()
        .unwrap();
    write!(file, "MZ").unwrap();

    Command::cargo_bin("docmark")
        .unwrap()
        .arg("convert")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not supported"));
}

#[test]
fn missing_input_is_an_error() {
    Command::cargo_bin("docmark")
        .unwrap()
        .arg("convert")
        .arg("/nonexistent/input.txt")
        .assert()
        .failure();
}

#[test]
fn help_hides_the_worker_subcommand() {
    Command::cargo_bin("docmark")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("convert"))
        .stdout(predicate::str::contains("worker").not());
}
