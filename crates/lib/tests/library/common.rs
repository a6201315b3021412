//! Shared helpers for library integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kiln_lib::execute::{BuildSummary, CollectingReporter, ExecuteConfig, ExecuteError, Interrupt, build};
use kiln_lib::manifest::BuildFile;
use kiln_lib::session::{ActionGraph, Session, TargetGraph};
use tempfile::TempDir;

/// A project directory with a `kiln.toml`.
pub struct Project {
  pub temp: TempDir,
}

impl Project {
  pub fn new(build_file: &str) -> Self {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("kiln.toml"), build_file).unwrap();
    Self { temp }
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn build_dir(&self) -> PathBuf {
    self.root().join("build")
  }

  pub fn write(&self, name: &str, content: &str) {
    let path = self.root().join(name);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
  }

  /// Load the build file into a fresh session and translate every target.
  pub fn load(&self, options: &[(&str, &str)]) -> (Session, ActionGraph) {
    let file = BuildFile::load(&self.root().join("kiln.toml")).unwrap();
    let mut merged = file.options.clone();
    merged.extend(options.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    let mut session = Session::new(self.build_dir()).with_options(merged);
    file.declare(&mut session).unwrap();
    let graph = TargetGraph::from_session(&session)
      .unwrap()
      .translate(&mut session)
      .unwrap();
    (session, graph)
  }

  /// Run a complete build the way the CLI does.
  pub async fn build(&self, options: &[(&str, &str)]) -> Result<BuildSummary, ExecuteError> {
    let (session, graph) = self.load(options);
    let config = ExecuteConfig {
      poll_interval: Duration::from_millis(10),
      ..ExecuteConfig::default()
    };
    build(&session, &graph, &config, &CollectingReporter::default(), &Interrupt::new()).await
  }
}
