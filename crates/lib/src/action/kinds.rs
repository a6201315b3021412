//! Built-in action kinds.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use super::{Action, ActionKind, ActionProcess, CommandQueue, HashComponent, default_hash_components};
use crate::export::ExportCommand;
use crate::util::shell;

/// Completes immediately with exit code 0 and never spawns anything.
///
/// Emitted by targets that produce no work so their dependents still have an
/// action to wait on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullAction;

impl ActionKind for NullAction {
  fn kind(&self) -> &'static str {
    "null"
  }

  fn execute(&self, action: &Action) -> ActionProcess {
    ActionProcess::finished(action.identifier(), 0, Vec::new())
  }
}

/// Runs an ordered queue of commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandsAction {
  pub queue: CommandQueue,
  /// Export pool hint, see [`crate::consts::CONSOLE_POOL`].
  pub pool: Option<String>,
}

impl ActionKind for CommandsAction {
  fn kind(&self) -> &'static str {
    "commands"
  }

  fn display(&self, _action: &Action, full: bool) -> String {
    let commands = &self.queue.commands;
    match commands.split_first() {
      None => "(no commands)".to_string(),
      Some(_) if full => commands.iter().map(|c| shell::join(c)).collect::<Vec<_>>().join(" && "),
      Some((first, [])) => shell::join(first),
      Some((first, rest)) => format!("{} (+{} more)", shell::join(first), rest.len()),
    }
  }

  /// The default components plus every argument vector, the environment
  /// overrides and the working directory.
  fn hash_components(&self, action: &Action) -> Vec<HashComponent> {
    let mut components = default_hash_components(action);
    for argv in &self.queue.commands {
      components.push(HashComponent::data(argv.join("\0")));
    }
    for (key, value) in &self.queue.env {
      components.push(HashComponent::data(format!("{}={}", key, value)));
    }
    if let Some(cwd) = &self.queue.cwd {
      components.push(HashComponent::File {
        path: cwd.clone(),
        input: false,
      });
    }
    components
  }

  fn execute(&self, action: &Action) -> ActionProcess {
    ActionProcess::spawn(action.display(false), self.queue.clone())
  }

  fn export(&self, _action: &Action) -> Option<ExportCommand> {
    Some(ExportCommand {
      commands: self.queue.commands.clone(),
      cwd: self.queue.cwd.clone(),
      env: self.queue.env.clone(),
      pool: self.pool.clone(),
    })
  }
}

/// Creates a directory. Skippable whenever the directory already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkdirAction {
  pub directory: PathBuf,
}

impl ActionKind for MkdirAction {
  fn kind(&self) -> &'static str {
    "mkdir"
  }

  fn display(&self, _action: &Action, _full: bool) -> String {
    format!("mkdir {}", self.directory.display())
  }

  fn skippable(&self, _action: &Action) -> Option<bool> {
    Some(self.directory.is_dir())
  }

  fn execute(&self, action: &Action) -> ActionProcess {
    let display = action.display(false);
    match fs::create_dir_all(&self.directory) {
      Ok(()) => {
        debug!(directory = ?self.directory, "created directory");
        ActionProcess::finished(display, 0, Vec::new())
      }
      Err(err) => {
        let message = format!("kiln: cannot create {}: {}\n", self.directory.display(), err);
        ActionProcess::finished(display, 1, message.into_bytes())
      }
    }
  }

  fn export(&self, _action: &Action) -> Option<ExportCommand> {
    Some(ExportCommand {
      commands: vec![vec![
        "mkdir".to_string(),
        "-p".to_string(),
        self.directory.to_string_lossy().into_owned(),
      ]],
      ..Default::default()
    })
  }
}
