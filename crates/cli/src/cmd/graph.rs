//! Implementation of the `kiln graph` command.

use anyhow::{Context as _, Result};

use kiln_lib::session::TargetGraph;

use super::{Context, Workspace};

pub fn cmd_graph(ctx: &Context, targets: &[String], actions: bool) -> Result<()> {
  let workspace = Workspace::load(ctx, &[], None)?;

  let dot = if actions {
    workspace.action_graph(targets)?.to_dot(&workspace.session)
  } else if targets.is_empty() {
    TargetGraph::from_session(&workspace.session)
      .context("Failed to build target graph")?
      .to_dot(&workspace.session)
  } else {
    let ids = workspace.resolve(targets)?;
    TargetGraph::select(&workspace.session, &ids)
      .context("Failed to build target graph")?
      .to_dot(&workspace.session)
  };

  print!("{}", dot);
  Ok(())
}
