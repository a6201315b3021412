//! Remote artifact cache ("stash") interface.
//!
//! The engine only ever addresses a stash with keys produced by
//! [`crate::hash::compute_key`]; it never inspects stash internals. Files are
//! stored by name, which the engine derives from each output's file name.

mod local;

pub use local::LocalStash;

use std::io;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::util::hash::HashKey;

#[derive(Debug, Error)]
pub enum StashError {
  #[error("stash entry {0} already exists")]
  DuplicateKey(HashKey),

  #[error("stash entry {key} has no file named '{name}'")]
  MissingFile { key: HashKey, name: String },

  #[error("stash file '{name}' of {key} is corrupt")]
  Corrupt { key: HashKey, name: String },

  #[error("invalid stash file name '{0}'")]
  InvalidName(String),

  #[error("stash is read-only")]
  ReadOnly,

  #[error("stash io error: {0}")]
  Io(#[from] io::Error),

  #[error("stash metadata error: {0}")]
  Metadata(#[from] serde_json::Error),
}

/// A store of artifact sets addressed by hash key.
pub trait StashBackend: Send + Sync + std::fmt::Debug {
  /// Whether new entries can be uploaded.
  fn can_create(&self) -> bool;

  fn find_by_key(&self, key: &HashKey) -> Result<Option<Box<dyn StashArtifacts>>, StashError>;

  fn begin_upload(&self, key: &HashKey) -> Result<Box<dyn StashBuilder>, StashError>;
}

/// A stored artifact set.
pub trait StashArtifacts: Send {
  fn key(&self) -> &HashKey;

  /// Names of the stored files.
  fn files(&self) -> Vec<String>;

  fn description(&self) -> Option<&str>;

  fn ttl(&self) -> Option<Duration>;

  /// Copy the file `name` to `dest`, creating parent directories.
  fn restore(&self, name: &str, dest: &Path) -> Result<(), StashError>;
}

/// An artifact set being assembled for upload.
pub trait StashBuilder: Send {
  fn add_file(&mut self, name: &str, source: &Path) -> Result<(), StashError>;

  fn set_ttl(&mut self, ttl: Option<Duration>);

  fn set_description(&mut self, description: &str);

  /// Publish the entry.
  fn commit(self: Box<Self>) -> Result<(), StashError>;
}
