//! Export command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn export_writes_ninja_file() {
  let env = TestEnv::from_fixture("copy.toml");

  env
    .kiln_cmd()
    .arg("export")
    .assert()
    .success()
    .stdout(predicate::str::contains("build.ninja"));

  let ninja = std::fs::read_to_string(env.build_dir().join("build.ninja")).unwrap();
  assert!(ninja.contains("rule demo_copy_run"));
  assert!(ninja.contains("build demo$:all: phony"));

  let state = std::fs::read_to_string(env.build_dir().join("kiln-state.json")).unwrap();
  assert!(state.contains("\"ninja\""));
}

#[test]
fn export_to_custom_path() {
  let env = TestEnv::from_fixture("copy.toml");
  let out = env.root().join("custom.ninja");

  env.kiln_cmd().arg("export").arg("-o").arg(&out).assert().success();

  assert!(out.exists());
}
