//! Serde model of `kiln.toml`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::target::TargetKind;
use crate::target::kinds::{AliasTarget, CommandsTarget, MkdirTarget};

fn default_version() -> String {
  "0".to_string()
}

/// `[scope]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeEntry {
  pub name: String,
  #[serde(default = "default_version")]
  pub version: String,
}

/// One `[[target]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTargetEntry")]
pub struct TargetEntry {
  pub name: String,
  #[serde(flatten)]
  pub kind: KindEntry,
  #[serde(default)]
  pub deps: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub visible_deps: Option<Vec<String>>,
}

impl TargetEntry {
  /// Every reference this entry makes, deps first.
  pub fn references(&self) -> impl Iterator<Item = &str> {
    self
      .deps
      .iter()
      .chain(self.visible_deps.iter().flatten())
      .map(String::as_str)
  }
}

/// Kind-specific fields, selected by `kind = "..."`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KindEntry {
  Commands {
    commands: Vec<Vec<String>>,
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    pure: bool,
    capture: bool,
    pool: Option<String>,
  },
  Alias,
  Mkdir {
    directories: Vec<PathBuf>,
  },
}

impl KindEntry {
  pub fn name(&self) -> &'static str {
    match self {
      KindEntry::Commands { .. } => "commands",
      KindEntry::Alias => "alias",
      KindEntry::Mkdir { .. } => "mkdir",
    }
  }

  /// Build the target kind object this entry describes.
  pub fn to_kind(&self) -> Arc<dyn TargetKind> {
    match self {
      KindEntry::Commands {
        commands,
        inputs,
        outputs,
        cwd,
        env,
        pure,
        capture,
        pool,
      } => Arc::new(CommandsTarget {
        commands: commands.clone(),
        inputs: inputs.clone(),
        outputs: outputs.clone(),
        cwd: cwd.clone(),
        env: env.clone(),
        pure: *pure,
        capture: *capture,
        pool: pool.clone(),
      }),
      KindEntry::Alias => Arc::new(AliasTarget),
      KindEntry::Mkdir { directories } => Arc::new(MkdirTarget {
        directories: directories.clone(),
      }),
    }
  }
}

/// Every field any kind accepts. Keys outside this set are rejected, and
/// fields that belong to another kind are rejected by the conversion.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTargetEntry {
  name: String,
  kind: String,
  #[serde(default)]
  deps: Vec<String>,
  visible_deps: Option<Vec<String>>,
  commands: Option<Vec<Vec<String>>>,
  inputs: Option<Vec<PathBuf>>,
  outputs: Option<Vec<PathBuf>>,
  cwd: Option<PathBuf>,
  env: Option<BTreeMap<String, String>>,
  pure: Option<bool>,
  capture: Option<bool>,
  pool: Option<String>,
  directories: Option<Vec<PathBuf>>,
}

impl RawTargetEntry {
  /// Names of the kind-specific fields that were set.
  fn kind_fields(&self) -> Vec<&'static str> {
    [
      ("commands", self.commands.is_some()),
      ("inputs", self.inputs.is_some()),
      ("outputs", self.outputs.is_some()),
      ("cwd", self.cwd.is_some()),
      ("env", self.env.is_some()),
      ("pure", self.pure.is_some()),
      ("capture", self.capture.is_some()),
      ("pool", self.pool.is_some()),
      ("directories", self.directories.is_some()),
    ]
    .into_iter()
    .filter_map(|(field, set)| set.then_some(field))
    .collect()
  }
}

impl TryFrom<RawTargetEntry> for TargetEntry {
  type Error = String;

  fn try_from(raw: RawTargetEntry) -> Result<Self, Self::Error> {
    let allowed: &[&str] = match raw.kind.as_str() {
      "commands" => &["commands", "inputs", "outputs", "cwd", "env", "pure", "capture", "pool"],
      "alias" => &[],
      "mkdir" => &["directories"],
      other => {
        return Err(format!(
          "unknown target kind `{other}`, expected one of `commands`, `alias`, `mkdir`"
        ));
      }
    };
    if let Some(field) = raw.kind_fields().into_iter().find(|f| !allowed.contains(f)) {
      return Err(format!(
        "field `{field}` is not valid for {} target '{}'",
        raw.kind, raw.name
      ));
    }

    let kind = match raw.kind.as_str() {
      "commands" => KindEntry::Commands {
        commands: raw.commands.unwrap_or_default(),
        inputs: raw.inputs.unwrap_or_default(),
        outputs: raw.outputs.unwrap_or_default(),
        cwd: raw.cwd,
        env: raw.env.unwrap_or_default(),
        pure: raw.pure.unwrap_or(true),
        capture: raw.capture.unwrap_or(true),
        pool: raw.pool,
      },
      "mkdir" => KindEntry::Mkdir {
        directories: raw
          .directories
          .ok_or_else(|| format!("mkdir target '{}' is missing `directories`", raw.name))?,
      },
      _ => KindEntry::Alias,
    };

    Ok(TargetEntry {
      name: raw.name,
      kind,
      deps: raw.deps,
      visible_deps: raw.visible_deps,
    })
  }
}

/// Raw document as it appears on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawBuildFile {
  pub scope: ScopeEntry,
  #[serde(default)]
  pub options: BTreeMap<String, toml::Value>,
  #[serde(default, rename = "target")]
  pub targets: Vec<TargetEntry>,
}
