//! Removal of the outputs an action graph produced.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::ExecuteError;
use crate::cache::CacheStore;
use crate::session::{ActionGraph, Session};

/// What [`clean`] removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanSummary {
  pub removed: Vec<PathBuf>,
  /// Recorded hash keys that were dropped.
  pub forgotten: usize,
}

/// Delete the outputs of every action in `graph` and forget their keys, so the
/// next build runs them again.
///
/// Dependents are cleaned before their dependencies. Directories are only
/// removed once empty; anything else left in them is kept.
pub fn clean(session: &Session, graph: &ActionGraph) -> Result<CleanSummary, ExecuteError> {
  let mut order = graph.topo_sort()?;
  order.reverse();

  let mut cache = CacheStore::load(session.build_dir())?;
  let mut summary = CleanSummary::default();

  for id in order {
    let action = session.action(id);
    for output in action.outputs() {
      if remove_output(output).map_err(|source| ExecuteError::Clean {
        path: output.clone(),
        source,
      })? {
        debug!(action = %action.identifier(), path = ?output, "removed output");
        summary.removed.push(output.clone());
      }
    }
    if cache.forget(action.identifier()) {
      summary.forgotten += 1;
    }
  }

  cache.save()?;
  info!(
    removed = summary.removed.len(),
    forgotten = summary.forgotten,
    "cleaned outputs"
  );
  Ok(summary)
}

/// Returns whether something was removed.
fn remove_output(path: &Path) -> io::Result<bool> {
  let metadata = match fs::symlink_metadata(path) {
    Ok(metadata) => metadata,
    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
    Err(err) => return Err(err),
  };

  if !metadata.is_dir() {
    fs::remove_file(path)?;
    return Ok(true);
  }
  match fs::remove_dir(path) {
    Ok(()) => Ok(true),
    Err(err) if err.kind() == io::ErrorKind::DirectoryNotEmpty => {
      debug!(path = ?path, "directory not empty, kept");
      Ok(false)
    }
    Err(err) => Err(err),
  }
}
