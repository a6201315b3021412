//! Implementation of the `kiln build` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::debug;

use kiln_lib::execute::{
  BuildReporter, BuildSummary, ExecuteConfig, ExecuteError, Interrupt, TracingReporter, build, clean,
};
use kiln_lib::stash::{LocalStash, StashBackend};

use super::{Context, Workspace};
use crate::output::{ConsoleReporter, format_duration, print_error, print_json, print_stat, print_success};

pub struct BuildArgs {
  pub targets: Vec<String>,
  pub define: Vec<String>,
  pub stash: Option<PathBuf>,
  pub no_capture: bool,
  pub json: bool,
  pub clean: bool,
}

/// Execute the build command.
///
/// Returns the process exit code: 0 on success, the failing action's exit
/// code, or 130 when interrupted.
pub fn cmd_build(ctx: &Context, args: &BuildArgs) -> Result<i32> {
  let workspace = Workspace::load(ctx, &args.define, args.no_capture.then_some(false))?;
  let graph = workspace.action_graph(&args.targets)?;
  if args.clean {
    let cleaned = clean(&workspace.session, &graph).context("Clean failed")?;
    debug!(removed = cleaned.removed.len(), "cleaned before build");
  }

  let config = ExecuteConfig {
    stash: args
      .stash
      .as_ref()
      .map(|dir| Arc::new(LocalStash::new(dir)) as Arc<dyn StashBackend>),
    ..ExecuteConfig::default()
  };
  // JSON output owns stdout, so progress goes to the log instead.
  let reporter: Box<dyn BuildReporter> = if args.json {
    Box::new(TracingReporter)
  } else {
    Box::new(ConsoleReporter::new(ctx.verbose))
  };
  let interrupt = Interrupt::new();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt.block_on(async {
    let handle = interrupt.clone();
    let watcher = tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        debug!("received interrupt");
        handle.trigger();
      }
    });
    let result = build(&workspace.session, &graph, &config, reporter.as_ref(), &interrupt).await;
    watcher.abort();
    result
  });

  match result {
    Ok(summary) => {
      print_summary(&summary, args.json)?;
      Ok(0)
    }
    Err(err) => {
      report_failure(&err);
      Ok(err.exit_code())
    }
  }
}

fn print_summary(summary: &BuildSummary, json: bool) -> Result<()> {
  if json {
    return print_json(&serde_json::json!({
      "executed": summary.executed,
      "skipped": summary.skipped,
      "restored": summary.restored,
      "elapsed_ms": summary.elapsed.as_millis() as u64,
    }));
  }

  print_success(&format!("Build complete in {}", format_duration(summary.elapsed)));
  print_stat("Executed", &summary.executed.len().to_string());
  print_stat("Up to date", &summary.skipped.len().to_string());
  if !summary.restored.is_empty() {
    print_stat("Restored", &summary.restored.len().to_string());
  }
  Ok(())
}

fn report_failure(err: &ExecuteError) {
  match err {
    ExecuteError::ActionFailed {
      action, command, code, ..
    } => {
      print_error(&format!("{} failed with exit code {}", action, code));
      eprintln!("  command: {}", command);
    }
    ExecuteError::Interrupted => print_error("Build interrupted"),
    other => print_error(&format!("Build failed: {}", other)),
  }
}
