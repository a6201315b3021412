//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated project directory.
///
/// Each test gets its own temporary directory holding `kiln.toml`; the build
/// directory defaults to `build/` inside it.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Create from a fixture file copied to `kiln.toml`.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("kiln.toml"), fixture_content(name)).unwrap();
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
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
  }

  /// A kiln command running inside the project directory.
  pub fn kiln_cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("kiln");
    cmd.current_dir(self.root());
    cmd
  }
}
