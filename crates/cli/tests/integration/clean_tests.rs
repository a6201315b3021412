//! Clean command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn clean_removes_outputs_and_forces_rebuild() {
  let env = TestEnv::from_fixture("copy.toml");
  env.write("src/in.txt", "hello");
  env.kiln_cmd().arg("build").assert().success();
  let out = env.build_dir().join("obj").join("out.txt");
  assert!(out.exists());

  env
    .kiln_cmd()
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed 2 outputs"));
  assert!(!out.exists());
  assert!(!env.build_dir().join("obj").exists());

  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("copying"));
  assert!(out.exists());
}

#[test]
fn build_clean_reruns_up_to_date_actions() {
  let env = TestEnv::from_fixture("copy.toml");
  env.write("src/in.txt", "hello");
  env.kiln_cmd().arg("build").assert().success();

  env
    .kiln_cmd()
    .args(["build", "--clean"])
    .assert()
    .success()
    .stdout(predicate::str::contains("copying"));
}
