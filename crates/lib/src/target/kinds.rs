//! Built-in generic target kinds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{NewAction, TargetKind, TranslateError, Translator};
use crate::action::CommandQueue;
use crate::action::kinds::{CommandsAction, MkdirAction, NullAction};
use crate::util::path::{absolutize, relative_to, to_slash};

/// Runs a queue of commands as a single action named `run`.
///
/// With no commands it emits a null action instead, so dependents still wait
/// on this target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandsTarget {
  pub commands: Vec<Vec<String>>,
  pub inputs: Vec<PathBuf>,
  pub outputs: Vec<PathBuf>,
  /// Relative to the scope directory; the scope directory when unset.
  pub cwd: Option<PathBuf>,
  pub env: BTreeMap<String, String>,
  pub pure: bool,
  pub capture: bool,
  pub pool: Option<String>,
}

impl CommandsTarget {
  pub fn new(commands: Vec<Vec<String>>) -> Self {
    Self {
      commands,
      inputs: Vec::new(),
      outputs: Vec::new(),
      cwd: None,
      env: BTreeMap::new(),
      pure: true,
      capture: true,
      pool: None,
    }
  }
}

impl TargetKind for CommandsTarget {
  fn kind(&self) -> &'static str {
    "commands"
  }

  fn translate(&self, tx: &mut Translator<'_>) -> Result<(), TranslateError> {
    let deps = tx.dep_targets();

    if self.commands.is_empty() {
      tx.new_action(NewAction::new("run", Arc::new(NullAction)).deps(deps))?;
      return Ok(());
    }

    if let Some(index) = self.commands.iter().position(Vec::is_empty) {
      return Err(tx.invalid(format!("command #{} is empty", index + 1)));
    }

    let cwd = absolutize(self.cwd.as_deref().unwrap_or(Path::new(".")), tx.directory());
    let kind = CommandsAction {
      queue: CommandQueue {
        commands: self.commands.clone(),
        cwd: Some(cwd),
        env: self.env.clone(),
        capture: self.capture,
      },
      pool: self.pool.clone(),
    };

    tx.new_action(
      NewAction::new("run", Arc::new(kind))
        .deps(deps)
        .inputs(self.inputs.iter().cloned())
        .outputs(self.outputs.iter().cloned())
        .pure(self.pure),
    )?;
    Ok(())
  }
}

/// Groups its dependencies behind a single null action named `ready`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AliasTarget;

impl TargetKind for AliasTarget {
  fn kind(&self) -> &'static str {
    "alias"
  }

  fn translate(&self, tx: &mut Translator<'_>) -> Result<(), TranslateError> {
    let deps = tx.dep_targets();
    tx.new_action(NewAction::new("ready", Arc::new(NullAction)).deps(deps))?;
    Ok(())
  }
}

/// Creates directories below the build directory, one action per directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MkdirTarget {
  pub directories: Vec<PathBuf>,
}

impl TargetKind for MkdirTarget {
  fn kind(&self) -> &'static str {
    "mkdir"
  }

  fn translate(&self, tx: &mut Translator<'_>) -> Result<(), TranslateError> {
    let deps = tx.dep_targets();

    if self.directories.is_empty() {
      tx.new_action(NewAction::new("ready", Arc::new(NullAction)).deps(deps))?;
      return Ok(());
    }

    for directory in &self.directories {
      let directory = absolutize(directory, tx.build_dir());
      let name = format!("mkdir_{}", action_suffix(&directory, tx.build_dir()));
      tx.new_action(
        NewAction::new(name, Arc::new(MkdirAction {
          directory: directory.clone(),
        }))
        .deps(deps.clone())
        .outputs([directory]),
      )?;
    }
    Ok(())
  }
}

/// A name-safe rendering of `directory` relative to `base`.
fn action_suffix(directory: &Path, base: &Path) -> String {
  to_slash(&relative_to(directory, base))
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') { c } else { '_' })
    .collect()
}
