//! Exporting a translated build file as a ninja file.

use std::fs;

use kiln_lib::export::write_ninja_file;

use super::common::Project;

#[test]
fn exports_every_target_of_the_build_file() {
  let project = Project::new(
    r#"
[scope]
name = "demo"

[[target]]
name = "dirs"
kind = "mkdir"
directories = ["obj"]

[[target]]
name = "gen"
kind = "commands"
deps = [":dirs"]
commands = [["sh", "-c", "echo hi > gen.txt"]]
outputs = ["gen.txt"]

[[target]]
name = "all"
kind = "alias"
deps = [":gen"]
"#,
  );

  let (session, graph) = project.load(&[]);
  let path = project.build_dir().join("build.ninja");
  write_ninja_file(&session, &graph, &path).unwrap();

  let text = fs::read_to_string(&path).unwrap();
  assert!(text.contains("rule demo_gen_run"));
  assert!(text.contains("rule demo_dirs_mkdir_obj"));
  assert!(text.contains("phony"));
  assert!(text.contains("mkdir -p"));
}
