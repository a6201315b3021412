//! Implementation of the `kiln list` command.

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use super::{Context, Workspace};
use crate::output::{print_info, print_json};

pub fn cmd_list(ctx: &Context, json: bool) -> Result<()> {
  let workspace = Workspace::load(ctx, &[], None)?;
  let session = &workspace.session;

  if json {
    let targets: Vec<_> = session
      .targets()
      .map(|target| {
        serde_json::json!({
          "target": target.identifier(),
          "kind": target.kind().kind(),
          "deps": target.deps().iter().map(|&d| session.target(d).identifier()).collect::<Vec<_>>(),
          "actions": target.actions().iter().map(|&a| session.action(a).identifier()).collect::<Vec<_>>(),
        })
      })
      .collect();
    return print_json(&targets);
  }

  if session.targets().next().is_none() {
    print_info("No targets declared");
    return Ok(());
  }

  for target in session.targets() {
    println!(
      "{} {}",
      target.identifier().if_supports_color(Stream::Stdout, |s| s.bold()),
      format!("({})", target.kind().kind()).if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
    for &id in target.actions() {
      let action = session.action(id);
      println!(
        "  {} {}",
        action.name(),
        action.display(false).if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
    }
  }
  Ok(())
}
