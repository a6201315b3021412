//! CLI smoke tests for kiln.
//!
//! These tests verify that every command runs without panicking and returns
//! the expected exit codes.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn kiln_cmd() -> Command {
  cargo_bin_cmd!("kiln")
}

/// Create a temp directory with a build file.
fn temp_project(content: &str) -> TempDir {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("kiln.toml"), content).unwrap();
  temp
}

const MINIMAL: &str = r#"
[scope]
name = "demo"

[[target]]
name = "all"
kind = "alias"
"#;

#[test]
fn help_flag_works() {
  kiln_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  kiln_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("kiln"));
}

#[test]
fn every_subcommand_has_help() {
  for sub in ["build", "export", "graph", "list"] {
    kiln_cmd().args([sub, "--help"]).assert().success();
  }
}

#[test]
fn missing_build_file_fails() {
  let temp = TempDir::new().unwrap();
  kiln_cmd()
    .current_dir(temp.path())
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("kiln.toml"));
}

#[test]
fn invalid_build_file_fails() {
  let temp = temp_project("[[target]]\nname = 1\n");
  kiln_cmd()
    .current_dir(temp.path())
    .arg("list")
    .assert()
    .failure();
}

#[test]
fn build_minimal_project() {
  let temp = temp_project(MINIMAL);
  kiln_cmd()
    .current_dir(temp.path())
    .arg("build")
    .assert()
    .success();
  assert!(temp.path().join("build").join("kiln-state.json").exists());
}

#[test]
fn list_minimal_project() {
  let temp = temp_project(MINIMAL);
  kiln_cmd()
    .current_dir(temp.path())
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("//demo:all"));
}

#[test]
fn graph_minimal_project() {
  let temp = temp_project(MINIMAL);
  kiln_cmd()
    .current_dir(temp.path())
    .arg("graph")
    .assert()
    .success()
    .stdout(predicate::str::contains("digraph"));
}

#[test]
fn unknown_target_fails() {
  let temp = temp_project(MINIMAL);
  kiln_cmd()
    .current_dir(temp.path())
    .args(["build", "missing"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("missing"));
}
