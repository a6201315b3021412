//! Build command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_runs_commands_and_prefixes_output() {
  let env = TestEnv::from_fixture("copy.toml");
  env.write("src/in.txt", "hello");

  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("[//demo:copy!run] copying"))
    .stdout(predicate::str::contains("Build complete"));

  let out = std::fs::read_to_string(env.build_dir().join("obj").join("out.txt")).unwrap();
  assert_eq!(out, "hello");
}

#[test]
fn build_is_incremental() {
  let env = TestEnv::from_fixture("copy.toml");
  env.write("src/in.txt", "hello");

  env.kiln_cmd().arg("build").assert().success();

  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("copying").not());

  let output = env.kiln_cmd().args(["build", "--json"]).output().unwrap();
  assert!(output.status.success());
  let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let skipped = summary["skipped"].as_array().unwrap();
  assert!(skipped.iter().any(|s| s == "//demo:copy!run"));
  assert!(skipped.iter().any(|s| s == "//demo:dirs!mkdir_obj"));
}

#[test]
fn option_change_rebuilds() {
  let env = TestEnv::from_fixture("copy.toml");
  env.write("src/in.txt", "hello");

  env.kiln_cmd().arg("build").assert().success();

  env
    .kiln_cmd()
    .args(["build", "-D", "profile=release"])
    .assert()
    .success()
    .stdout(predicate::str::contains("copying"));
}

#[test]
fn failing_action_sets_exit_code() {
  let env = TestEnv::from_fixture("failing.toml");

  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .code(3)
    .stdout(predicate::str::contains("about to fail"))
    .stderr(predicate::str::contains("//demo:broken!run"));

  assert!(!env.build_dir().join("after.txt").exists());
}

#[test]
fn build_selected_target_only() {
  let env = TestEnv::from_fixture("copy.toml");
  env.write("src/in.txt", "hello");

  env
    .kiln_cmd()
    .args(["build", "dirs"])
    .assert()
    .success();

  assert!(env.build_dir().join("obj").is_dir());
  assert!(!env.build_dir().join("obj").join("out.txt").exists());
}

#[test]
fn build_restores_from_stash() {
  let env = TestEnv::from_fixture("copy.toml");
  env.write("src/in.txt", "hello");
  let stash = env.root().join("stash");

  env
    .kiln_cmd()
    .arg("build")
    .arg("--stash")
    .arg(&stash)
    .assert()
    .success();

  std::fs::remove_dir_all(env.build_dir()).unwrap();

  env
    .kiln_cmd()
    .arg("build")
    .arg("--stash")
    .arg(&stash)
    .assert()
    .success()
    .stdout(predicate::str::contains("restored from stash"));

  let out = std::fs::read_to_string(env.build_dir().join("obj").join("out.txt")).unwrap();
  assert_eq!(out, "hello");
}
