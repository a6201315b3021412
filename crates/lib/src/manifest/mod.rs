//! Declarative build files.
//!
//! A `kiln.toml` declares one scope, its default options and a list of
//! targets. Targets may reference each other in any order; declaration order
//! is derived from the dependency graph.

mod types;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::graph::{DirectedGraph, GraphError};
use crate::session::{Scope, Session, SessionError, TargetDecl, TargetId, TargetRef};

pub use types::{KindEntry, ScopeEntry, TargetEntry};
use types::RawBuildFile;

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read build file {path}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse build file {path}: {message}")]
  Parse { path: PathBuf, message: String },

  #[error("target '{target}' references unknown target '{reference}'")]
  UnknownReference { target: String, reference: String },

  #[error("target '{name}' must be named without a scope in build file of scope '{scope}'")]
  ScopedName { name: String, scope: String },

  #[error("target '{target}' is declared more than once")]
  DuplicateTarget { target: String },

  #[error("dependency cycle between targets: {}", .0.join(", "))]
  Cycle(Vec<String>),

  #[error(transparent)]
  Session(#[from] SessionError),

  #[error(transparent)]
  Graph(GraphError),
}

impl From<GraphError> for ManifestError {
  fn from(err: GraphError) -> Self {
    match err {
      GraphError::Cycle { remaining } => ManifestError::Cycle(remaining),
      other => ManifestError::Graph(other),
    }
  }
}

/// A parsed `kiln.toml`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildFile {
  path: PathBuf,
  directory: PathBuf,
  pub scope: ScopeEntry,
  pub options: BTreeMap<String, String>,
  pub targets: Vec<TargetEntry>,
}

impl BuildFile {
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let directory = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or(Path::new("."))
      .to_path_buf();
    Self::parse(&text, path, &directory)
  }

  /// Parse build file text. `directory` becomes the scope directory.
  pub fn parse(text: &str, path: &Path, directory: &Path) -> Result<Self, ManifestError> {
    let raw: RawBuildFile = toml::from_str(text).map_err(|err| ManifestError::Parse {
      path: path.to_path_buf(),
      message: err.to_string(),
    })?;

    let options = raw
      .options
      .into_iter()
      .map(|(key, value)| {
        let value = match value {
          toml::Value::String(s) => s,
          other => other.to_string(),
        };
        (key, value)
      })
      .collect();

    debug!(path = %path.display(), targets = raw.targets.len(), "parsed build file");
    Ok(Self {
      path: path.to_path_buf(),
      directory: directory.to_path_buf(),
      scope: raw.scope,
      options,
      targets: raw.targets,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// Override the capture setting of every commands target.
  pub fn force_capture(&mut self, capture: bool) {
    for target in &mut self.targets {
      if let KindEntry::Commands { capture: c, .. } = &mut target.kind {
        *c = capture;
      }
    }
  }

  /// Register the scope and declare every target, dependencies first.
  ///
  /// Returns the declared targets in file order.
  pub fn declare(&self, session: &mut Session) -> Result<Vec<TargetId>, ManifestError> {
    let scope = &self.scope.name;
    session.register_scope(Scope::new(scope.clone(), &self.directory, self.scope.version.clone()))?;

    let mut order: DirectedGraph<String, usize> = DirectedGraph::new();
    for (index, entry) in self.targets.iter().enumerate() {
      let target = TargetRef::parse(&entry.name)?;
      if target.scope.as_ref().is_some_and(|s| s != scope) {
        return Err(ManifestError::ScopedName {
          name: entry.name.clone(),
          scope: scope.clone(),
        });
      }
      let identifier = target.identifier(scope);
      if order.contains(&identifier) {
        return Err(ManifestError::DuplicateTarget {
          target: identifier,
        });
      }
      order.add(identifier, index)?;
    }

    let mut references: Vec<Vec<String>> = Vec::with_capacity(self.targets.len());
    for entry in &self.targets {
      let from = TargetRef::parse(&entry.name)?.identifier(scope);
      let mut resolved = Vec::new();
      for reference in entry.references() {
        let identifier = TargetRef::parse(reference)?.identifier(scope);
        if order.contains(&identifier) {
          if !order.has_edge(&identifier, &from) {
            order.edge(&identifier, &from)?;
          }
        } else if session.find_target(&identifier).is_none() {
          return Err(ManifestError::UnknownReference {
            target: from,
            reference: reference.to_string(),
          });
        }
        resolved.push(identifier);
      }
      references.push(resolved);
    }

    let mut declared: BTreeMap<usize, TargetId> = BTreeMap::new();
    for identifier in order.topo_sort()? {
      let Some(&index) = order.get(&identifier) else {
        continue;
      };
      let entry = &self.targets[index];
      let lookup = |id: &String| session.find_target(id).ok_or_else(|| SessionError::UnknownTarget(id.clone()));

      let dep_count = entry.deps.len();
      let deps = references[index][..dep_count]
        .iter()
        .map(lookup)
        .collect::<Result<Vec<_>, _>>()?;
      let mut decl = TargetDecl::new(scope.clone(), entry_name(&entry.name), entry.kind.to_kind()).deps(deps);
      if entry.visible_deps.is_some() {
        let visible = references[index][dep_count..]
          .iter()
          .map(lookup)
          .collect::<Result<Vec<_>, _>>()?;
        decl = decl.visible_deps(visible);
      }

      let id = session.declare_target(decl)?;
      debug!(target = %identifier, kind = entry.kind.name(), "declared target");
      declared.insert(index, id);
    }

    Ok(declared.into_values().collect())
  }
}

/// The bare name of a `[//scope]:name` or `name` entry.
fn entry_name(name: &str) -> &str {
  name.rsplit_once(':').map_or(name, |(_, n)| n)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::TargetGraph;
  use tempfile::TempDir;

  const SAMPLE: &str = r#"
[scope]
name = "demo"
version = "1.0.0"

[options]
profile = "debug"
jobs = 4

[[target]]
name = "all"
kind = "alias"
deps = [":gen", "dirs"]

[[target]]
name = "gen"
kind = "commands"
deps = ["dirs"]
commands = [["sh", "-c", "echo hi > gen.txt"]]
outputs = ["gen.txt"]
env = { KEY = "value" }
pool = "console"

[[target]]
name = "dirs"
kind = "mkdir"
directories = ["obj"]
"#;

  fn write(temp: &TempDir, text: &str) -> PathBuf {
    let path = temp.path().join("kiln.toml");
    fs::write(&path, text).unwrap();
    path
  }

  #[test]
  fn load_reads_scope_options_and_targets() {
    let temp = TempDir::new().unwrap();
    let file = BuildFile::load(&write(&temp, SAMPLE)).unwrap();

    assert_eq!(file.scope.name, "demo");
    assert_eq!(file.scope.version, "1.0.0");
    assert_eq!(file.directory(), temp.path());
    assert_eq!(file.options.get("profile").map(String::as_str), Some("debug"));
    assert_eq!(file.options.get("jobs").map(String::as_str), Some("4"));
    assert_eq!(file.targets.len(), 3);
  }

  #[test]
  fn declare_orders_targets_by_dependency() {
    let temp = TempDir::new().unwrap();
    let file = BuildFile::load(&write(&temp, SAMPLE)).unwrap();
    let mut session = Session::new(temp.path().join("build"));
    let ids = file.declare(&mut session).unwrap();

    let names: Vec<&str> = ids.iter().map(|&id| session.target(id).name()).collect();
    assert_eq!(names, vec!["all", "gen", "dirs"]);

    let all = session.target(ids[0]);
    assert_eq!(all.deps(), &[ids[1], ids[2]]);

    let graph = TargetGraph::from_session(&session).unwrap().translate(&mut session).unwrap();
    assert!(graph.contains("//demo:gen!run"));
    assert!(graph.contains("//demo:dirs!mkdir_obj"));
  }

  #[test]
  fn unknown_reference_is_an_error() {
    let temp = TempDir::new().unwrap();
    let text = "[scope]\nname = \"demo\"\n\n[[target]]\nname = \"a\"\nkind = \"alias\"\ndeps = [\":missing\"]\n";
    let file = BuildFile::load(&write(&temp, text)).unwrap();
    let err = file.declare(&mut Session::new(temp.path().join("build"))).unwrap_err();
    assert!(matches!(err, ManifestError::UnknownReference { ref reference, .. } if reference == ":missing"));
  }

  #[test]
  fn cycles_are_reported() {
    let temp = TempDir::new().unwrap();
    let text = r#"
[scope]
name = "demo"

[[target]]
name = "a"
kind = "alias"
deps = ["b"]

[[target]]
name = "b"
kind = "alias"
deps = ["a"]
"#;
    let file = BuildFile::load(&write(&temp, text)).unwrap();
    let err = file.declare(&mut Session::new(temp.path().join("build"))).unwrap_err();
    match err {
      ManifestError::Cycle(remaining) => assert_eq!(remaining, vec!["//demo:a", "//demo:b"]),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn duplicate_names_are_rejected() {
    let temp = TempDir::new().unwrap();
    let text = "[scope]\nname = \"demo\"\n\n[[target]]\nname = \"a\"\nkind = \"alias\"\n\n[[target]]\nname = \"a\"\nkind = \"alias\"\n";
    let file = BuildFile::load(&write(&temp, text)).unwrap();
    let err = file.declare(&mut Session::new(temp.path().join("build"))).unwrap_err();
    assert!(matches!(err, ManifestError::DuplicateTarget { .. }));
  }

  #[test]
  fn names_in_another_scope_are_rejected() {
    let temp = TempDir::new().unwrap();
    let text = "[scope]\nname = \"demo\"\n\n[[target]]\nname = \"//other:x\"\nkind = \"alias\"\n";
    let file = BuildFile::load(&write(&temp, text)).unwrap();
    let mut session = Session::new(temp.path().join("build"));
    let err = file.declare(&mut session).unwrap_err();

    assert!(matches!(err, ManifestError::ScopedName { ref name, .. } if name == "//other:x"));
    assert!(session.find_target("//demo:x").is_none());
  }

  #[test]
  fn missing_scope_is_a_parse_error() {
    let temp = TempDir::new().unwrap();
    let err = BuildFile::load(&write(&temp, "[[target]]\nname = \"a\"\nkind = \"alias\"\n")).unwrap_err();
    assert!(matches!(err, ManifestError::Parse { .. }));
  }

  #[test]
  fn force_capture_overrides_commands_targets() {
    let temp = TempDir::new().unwrap();
    let mut file = BuildFile::load(&write(&temp, SAMPLE)).unwrap();
    file.force_capture(false);
    let gen_entry = file.targets.iter().find(|t| t.name == "gen").unwrap();
    assert!(matches!(gen_entry.kind, KindEntry::Commands { capture: false, .. }));
  }
}
