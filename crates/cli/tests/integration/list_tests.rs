//! List and graph command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn list_shows_targets_and_actions() {
  let env = TestEnv::from_fixture("copy.toml");

  env
    .kiln_cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("//demo:copy"))
    .stdout(predicate::str::contains("mkdir_obj"));
}

#[test]
fn list_json_is_parseable() {
  let env = TestEnv::from_fixture("copy.toml");

  let output = env.kiln_cmd().args(["list", "--json"]).output().unwrap();
  assert!(output.status.success());

  let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let targets = value.as_array().unwrap();
  assert_eq!(targets.len(), 3);
  let all = targets.iter().find(|t| t["target"] == "//demo:all").unwrap();
  assert_eq!(all["kind"], "alias");
  assert_eq!(all["actions"][0], "//demo:all!ready");
}

#[test]
fn graph_of_actions() {
  let env = TestEnv::from_fixture("copy.toml");

  env
    .kiln_cmd()
    .args(["graph", "--actions", "all"])
    .assert()
    .success()
    .stdout(predicate::str::contains("//demo:copy!run"));
}
