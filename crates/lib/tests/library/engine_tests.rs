//! Incremental build behavior across sessions.

use std::fs;

use kiln_lib::cache::CacheStore;
use kiln_lib::execute::ExecuteError;

use super::common::Project;

const COPY: &str = r#"
[scope]
name = "demo"
version = "1.0.0"

[options]
profile = "debug"

[[target]]
name = "copy"
kind = "commands"
commands = [["sh", "-c", "cat src/in.txt > \"$OUT\""]]
inputs = ["src/in.txt"]
outputs = ["out.txt"]
env = { OUT = "build/out.txt" }

[[target]]
name = "all"
kind = "alias"
deps = [":copy"]
"#;

#[tokio::test]
async fn rebuilds_only_when_inputs_change() {
  let project = Project::new(COPY);
  project.write("src/in.txt", "one");

  let first = project.build(&[]).await.unwrap();
  assert!(first.executed.contains(&"//demo:copy!run".to_string()));
  assert_eq!(fs::read_to_string(project.build_dir().join("out.txt")).unwrap(), "one");

  let second = project.build(&[]).await.unwrap();
  assert_eq!(second.skipped, vec!["//demo:copy!run".to_string()]);

  project.write("src/in.txt", "two");
  let third = project.build(&[]).await.unwrap();
  assert!(third.executed.contains(&"//demo:copy!run".to_string()));
  assert_eq!(fs::read_to_string(project.build_dir().join("out.txt")).unwrap(), "two");
}

#[tokio::test]
async fn changed_options_discard_recorded_keys() {
  let project = Project::new(COPY);
  project.write("src/in.txt", "one");

  project.build(&[]).await.unwrap();
  let summary = project.build(&[("profile", "release")]).await.unwrap();
  assert!(summary.executed.contains(&"//demo:copy!run".to_string()));

  let state = CacheStore::load(&project.build_dir()).unwrap();
  assert_eq!(state.options().get("profile").map(String::as_str), Some("release"));
  assert_eq!(state.backend(), Some("native"));
}

#[tokio::test]
async fn removed_targets_are_pruned_from_state() {
  let project = Project::new(COPY);
  project.write("src/in.txt", "one");
  project.build(&[]).await.unwrap();

  fs::write(
    project.root().join("kiln.toml"),
    "[scope]\nname = \"demo\"\nversion = \"1.0.0\"\n\n[options]\nprofile = \"debug\"\n",
  )
  .unwrap();
  project.build(&[]).await.unwrap();

  let state = CacheStore::load(&project.build_dir()).unwrap();
  assert!(state.is_empty());
}

#[tokio::test]
async fn failing_target_reports_its_exit_code() {
  let project = Project::new(
    r#"
[scope]
name = "demo"

[[target]]
name = "broken"
kind = "commands"
commands = [["sh", "-c", "echo oops; exit 4"]]
"#,
  );

  let err = project.build(&[]).await.unwrap_err();
  assert_eq!(err.exit_code(), 4);
  match err {
    ExecuteError::ActionFailed { action, output, .. } => {
      assert_eq!(action, "//demo:broken!run");
      assert!(output.contains("oops"));
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test]
async fn scope_version_change_invalidates_keys() {
  let project = Project::new(COPY);
  project.write("src/in.txt", "one");
  project.build(&[]).await.unwrap();

  fs::write(project.root().join("kiln.toml"), COPY.replace("1.0.0", "1.1.0")).unwrap();
  let summary = project.build(&[]).await.unwrap();
  assert!(summary.executed.contains(&"//demo:copy!run".to_string()));
}
