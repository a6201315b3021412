//! Export of the action graph to lower-level build descriptions.
//!
//! [`collect`] flattens an [`ActionGraph`] into [`ExportAction`]s in
//! dependency order; a writer such as [`NinjaWriter`] renders them.

mod ninja;

pub use ninja::{NinjaWriter, escape_path, write_ninja_file};

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::graph::GraphError;
use crate::session::{ActionGraph, ActionId, Session};

#[derive(Debug, Error)]
pub enum ExportError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("failed to write {path}: {source}")]
  Write { path: PathBuf, source: io::Error },
}

/// What an action kind contributes to an export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportCommand {
  pub commands: Vec<Vec<String>>,
  pub cwd: Option<PathBuf>,
  pub env: BTreeMap<String, String>,
  /// `Some(CONSOLE_POOL)` runs the action alone on the terminal.
  pub pool: Option<String>,
}

/// One action, ready to be rendered by an export backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportAction {
  pub id: ActionId,
  pub identifier: String,
  /// Sanitized, unique rule name. Also the action's phony alias.
  pub rule: String,
  pub description: String,
  /// Empty for actions that only group their dependencies.
  pub commands: Vec<Vec<String>>,
  pub cwd: Option<PathBuf>,
  pub env: BTreeMap<String, String>,
  pub inputs: Vec<PathBuf>,
  pub outputs: Vec<PathBuf>,
  /// Outputs of dependency actions.
  pub implicit_deps: Vec<PathBuf>,
  /// Aliases of dependency actions without outputs.
  pub order_only: Vec<String>,
  pub pool: Option<String>,
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
    .collect()
}

/// Flatten `graph` in dependency order.
pub fn collect(session: &Session, graph: &ActionGraph) -> Result<Vec<ExportAction>, ExportError> {
  let mut taken: HashMap<String, usize> = HashMap::new();
  let mut rules: HashMap<ActionId, String> = HashMap::new();
  let mut exported = Vec::with_capacity(graph.len());

  for id in graph.topo_sort()? {
    let action = session.action(id);

    let base = sanitize(action.identifier().trim_start_matches('/'));
    let count = taken.entry(base.clone()).or_insert(0);
    *count += 1;
    let rule = if *count == 1 { base } else { format!("{}_{}", base, count) };

    let mut implicit_deps = Vec::new();
    let mut order_only = Vec::new();
    for dep in action.deps() {
      let dep_action = session.action(*dep);
      if dep_action.outputs().is_empty() {
        order_only.extend(rules.get(dep).cloned());
      } else {
        implicit_deps.extend(dep_action.outputs().iter().cloned());
      }
    }

    let command = action.kind().export(action).unwrap_or_default();
    rules.insert(id, rule.clone());
    exported.push(ExportAction {
      id,
      identifier: action.identifier().to_string(),
      rule,
      description: action.display(false),
      commands: command.commands,
      cwd: command.cwd,
      env: command.env,
      inputs: action.inputs().to_vec(),
      outputs: action.outputs().to_vec(),
      implicit_deps,
      order_only,
      pool: command.pool,
    });
  }

  Ok(exported)
}
