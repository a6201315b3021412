mod build;
mod clean;
mod export;
mod graph;
mod list;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use kiln_lib::consts::DEFAULT_BUILD_DIR;
use kiln_lib::execute::merge_options;
use kiln_lib::manifest::BuildFile;
use kiln_lib::session::{ActionGraph, Session, TargetGraph, TargetId};

pub use build::{BuildArgs, cmd_build};
pub use clean::cmd_clean;
pub use export::cmd_export;
pub use graph::cmd_graph;
pub use list::cmd_list;

/// Global options shared by every command.
pub struct Context {
  pub file: PathBuf,
  pub build_dir: Option<PathBuf>,
  pub verbose: bool,
}

/// A loaded build file with every target declared and translated.
pub struct Workspace {
  pub build_file: BuildFile,
  pub session: Session,
}

impl Workspace {
  pub fn load(ctx: &Context, defines: &[String], capture: Option<bool>) -> Result<Self> {
    let mut build_file =
      BuildFile::load(&ctx.file).with_context(|| format!("Failed to load {}", ctx.file.display()))?;
    if let Some(capture) = capture {
      build_file.force_capture(capture);
    }

    let options = merge_options(&build_file.options, defines.iter().map(String::as_str));
    let build_dir = ctx
      .build_dir
      .clone()
      .unwrap_or_else(|| build_file.directory().join(DEFAULT_BUILD_DIR));

    let mut session = Session::new(build_dir).with_options(options);
    build_file
      .declare(&mut session)
      .context("Failed to declare targets")?;
    let targets = TargetGraph::from_session(&session).context("Failed to order targets")?;
    targets
      .translate(&mut session)
      .context("Failed to translate targets")?;

    Ok(Self { build_file, session })
  }

  pub fn build_dir(&self) -> &Path {
    self.session.build_dir()
  }

  /// Resolve target references against the build file's scope.
  pub fn resolve(&self, targets: &[String]) -> Result<Vec<TargetId>> {
    targets
      .iter()
      .map(|reference| {
        self
          .session
          .resolve_str(reference, &self.build_file.scope.name)
          .with_context(|| format!("Unknown target '{}'", reference))
      })
      .collect()
  }

  /// Actions of the selected targets, or of every target when none are given.
  pub fn action_graph(&self, targets: &[String]) -> Result<ActionGraph> {
    if targets.is_empty() {
      return ActionGraph::from_session(&self.session).context("Failed to build action graph");
    }
    let ids = self.resolve(targets)?;
    ActionGraph::from_targets(&self.session, ids).context("Failed to build action graph")
  }
}
