//! Ninja build file writer.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tracing::info;

use super::{ExportAction, ExportError, collect};
use crate::consts::TOOL_VERSION;
use crate::session::{ActionGraph, Session};
use crate::util::shell;

/// Escape a path for use in a `build` line.
pub fn escape_path(path: &str) -> String {
  path.replace('$', "$$").replace(' ', "$ ").replace(':', "$:")
}

/// Escape a variable value (`command`, `description`).
fn escape_value(value: &str) -> String {
  value.replace('$', "$$").replace('\n', " ")
}

fn path_str(path: &Path) -> String {
  escape_path(&path.to_string_lossy())
}

/// Render the shell command of `action`: optional `cd`, then every command
/// with an `env` prefix for overrides, joined by `&&`.
pub(crate) fn render_command(action: &ExportAction) -> String {
  let env_prefix: String = action
    .env
    .iter()
    .map(|(k, v)| format!("{} ", shell::quote(&format!("{}={}", k, v))))
    .collect();
  let env_prefix = if env_prefix.is_empty() {
    env_prefix
  } else {
    format!("env {}", env_prefix)
  };

  let mut parts: Vec<String> = Vec::new();
  if let Some(cwd) = &action.cwd {
    parts.push(format!("cd {}", shell::quote(&cwd.to_string_lossy())));
  }
  parts.extend(
    action
      .commands
      .iter()
      .map(|argv| format!("{}{}", env_prefix, shell::join(argv))),
  );
  parts.join(" && ")
}

/// Writes actions as a ninja build file.
pub struct NinjaWriter<W: Write> {
  out: W,
}

impl<W: Write> NinjaWriter<W> {
  pub fn new(out: W) -> Self {
    Self { out }
  }

  pub fn into_inner(self) -> W {
    self.out
  }

  /// Header, one rule and build statement per action, then per-target aliases.
  pub fn write(&mut self, session: &Session, actions: &[ExportAction]) -> io::Result<()> {
    writeln!(self.out, "# Generated by {}", TOOL_VERSION)?;
    writeln!(self.out, "# Do not edit; regenerate with `kiln export`.")?;
    writeln!(self.out)?;
    writeln!(self.out, "builddir = {}", path_str(session.build_dir()))?;
    writeln!(self.out)?;

    for action in actions {
      self.write_action(action)?;
    }
    self.write_target_aliases(session, actions)
  }

  fn write_action(&mut self, action: &ExportAction) -> io::Result<()> {
    let mut deps = String::new();
    for input in &action.inputs {
      deps.push(' ');
      deps.push_str(&path_str(input));
    }

    if action.commands.is_empty() {
      for path in &action.implicit_deps {
        deps.push(' ');
        deps.push_str(&path_str(path));
      }
      for alias in &action.order_only {
        deps.push(' ');
        deps.push_str(&escape_path(alias));
      }
      writeln!(self.out, "# {}", action.identifier)?;
      writeln!(self.out, "build {}: phony{}", escape_path(&action.rule), deps)?;
      return writeln!(self.out);
    }

    if !action.implicit_deps.is_empty() {
      deps.push_str(" |");
      for path in &action.implicit_deps {
        deps.push(' ');
        deps.push_str(&path_str(path));
      }
    }
    if !action.order_only.is_empty() {
      deps.push_str(" ||");
      for alias in &action.order_only {
        deps.push(' ');
        deps.push_str(&escape_path(alias));
      }
    }

    writeln!(self.out, "rule {}", action.rule)?;
    writeln!(self.out, "  command = {}", escape_value(&render_command(action)))?;
    writeln!(self.out, "  description = {}", escape_value(&action.identifier))?;
    if let Some(pool) = &action.pool {
      writeln!(self.out, "  pool = {}", pool)?;
    }

    if action.outputs.is_empty() {
      writeln!(self.out, "build {}: {}{}", escape_path(&action.rule), action.rule, deps)?;
    } else {
      let outputs: Vec<String> = action.outputs.iter().map(|p| path_str(p)).collect();
      writeln!(self.out, "build {}: {}{}", outputs.join(" "), action.rule, deps)?;
      writeln!(self.out, "build {}: phony {}", escape_path(&action.rule), outputs.join(" "))?;
    }
    writeln!(self.out)
  }

  fn write_target_aliases(&mut self, session: &Session, actions: &[ExportAction]) -> io::Result<()> {
    for target in session.targets() {
      let aliases: Vec<String> = session
        .leaf_actions(target.id())
        .into_iter()
        .filter_map(|id| actions.iter().find(|a| a.id == id))
        .map(|a| escape_path(&a.rule))
        .collect();
      if aliases.is_empty() {
        continue;
      }
      let name = target.identifier().trim_start_matches('/');
      writeln!(self.out, "build {}: phony {}", escape_path(name), aliases.join(" "))?;
    }
    Ok(())
  }
}

/// Collect `graph` and write it to `path`, creating parent directories.
pub fn write_ninja_file(session: &Session, graph: &ActionGraph, path: &Path) -> Result<(), ExportError> {
  let write_err = |source| ExportError::Write {
    path: path.to_path_buf(),
    source,
  };
  let actions = collect(session, graph)?;

  let mut buffer = Vec::new();
  NinjaWriter::new(&mut buffer).write(session, &actions).map_err(write_err)?;

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(write_err)?;
  }
  fs::write(path, buffer).map_err(write_err)?;

  info!(path = ?path, actions = actions.len(), "wrote ninja file");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::export::tests::sample;
  use std::collections::BTreeMap;
  use std::path::PathBuf;
  use tempfile::TempDir;

  #[test]
  fn escape_path_handles_ninja_specials() {
    assert_eq!(escape_path("a b:c$d"), "a$ b$:c$$d");
  }

  #[test]
  fn render_command_with_cwd_and_env() {
    let temp = TempDir::new().unwrap();
    let (session, graph) = sample(&temp);
    let mut action = collect(&session, &graph).unwrap().remove(0);
    action.commands = vec![vec!["make".into()], vec!["echo".into(), "done now".into()]];
    action.cwd = Some(PathBuf::from("/work dir"));
    action.env = BTreeMap::from([("CC".to_string(), "clang".to_string())]);

    assert_eq!(
      render_command(&action),
      "cd '/work dir' && env CC=clang make && env CC=clang echo 'done now'"
    );
  }

  #[cfg(unix)]
  #[test]
  fn writes_rules_builds_and_aliases() {
    let temp = TempDir::new().unwrap();
    let (session, graph) = sample(&temp);
    let path = session.build_dir().join("build.ninja");

    write_ninja_file(&session, &graph, &path).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let build = path_str(session.build_dir());

    assert!(text.starts_with("# Generated by kiln/"));
    assert!(text.contains("rule demo_gen_run\n"));
    assert!(text.contains("  pool = console\n"));
    assert!(text.contains(&format!(
      "build {}/gen.txt: demo_gen_run | {}/obj\n",
      build, build
    )));
    assert!(text.contains(&format!("build demo_gen_run: phony {}/gen.txt\n", build)));
    assert!(text.contains(&format!(
      "build demo_all_ready: phony {}/gen.txt demo_check_run\n",
      build
    )));
    assert!(text.contains("build demo$:all: phony demo_all_ready\n"));
    assert!(text.contains("sh -c 'echo hi > gen.txt'"));
  }
}
