//! Implementation of the `kiln export` command.

use std::path::Path;

use anyhow::{Context as _, Result};

use kiln_lib::cache::CacheStore;
use kiln_lib::consts::NINJA_BACKEND;
use kiln_lib::export::write_ninja_file;

use super::{Context, Workspace};
use crate::output::print_success;

/// Write a ninja file for the selected targets and record the backend in the
/// build state, so a later native build starts from scratch.
pub fn cmd_export(ctx: &Context, targets: &[String], output: Option<&Path>, defines: &[String]) -> Result<()> {
  let workspace = Workspace::load(ctx, defines, None)?;
  let graph = workspace.action_graph(targets)?;

  let path = output
    .map(Path::to_path_buf)
    .unwrap_or_else(|| workspace.build_dir().join("build.ninja"));
  write_ninja_file(&workspace.session, &graph, &path).context("Export failed")?;

  let mut state = CacheStore::load(workspace.build_dir()).context("Failed to load build state")?;
  state.reconcile(NINJA_BACKEND, workspace.session.options());
  state.save().context("Failed to save build state")?;

  print_success(&format!("Wrote {} ({} actions)", path.display(), graph.len()));
  Ok(())
}
