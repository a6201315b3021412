//! Implementation of the `kiln clean` command.

use anyhow::{Context as _, Result};

use kiln_lib::execute::clean;

use super::{Context, Workspace};
use crate::output::{print_info, print_success};

/// Remove the outputs of the selected targets so the next build reruns them.
pub fn cmd_clean(ctx: &Context, targets: &[String], defines: &[String]) -> Result<()> {
  let workspace = Workspace::load(ctx, defines, None)?;
  let graph = workspace.action_graph(targets)?;

  let summary = clean(&workspace.session, &graph).context("Clean failed")?;
  if ctx.verbose {
    for path in &summary.removed {
      print_info(&format!("removed {}", path.display()));
    }
  }
  print_success(&format!(
    "Removed {} outputs, forgot {} keys",
    summary.removed.len(),
    summary.forgotten
  ));
  Ok(())
}
