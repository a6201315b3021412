//! Directory-backed stash.
//!
//! # Storage Layout
//!
//! ```text
//! {root}/
//! └── <key>/
//!     ├── stash.json     # key, description, ttl, created_at, files
//!     └── files/<name>
//! ```
//!
//! Uploads are staged in a temporary directory under `{root}` and renamed
//! into place on commit, so readers never observe a partial entry.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info};

use super::{StashArtifacts, StashBackend, StashBuilder, StashError};
use crate::consts::STASH_META_FILE;
use crate::util::hash::{HashKey, hash_file};

const FILES_DIR: &str = "files";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StashMeta {
  key: HashKey,
  #[serde(default)]
  description: Option<String>,
  /// Seconds.
  #[serde(default)]
  ttl: Option<u64>,
  /// Seconds since the Unix epoch.
  created_at: u64,
  /// File name to SHA-256 of its content.
  files: BTreeMap<String, String>,
}

impl StashMeta {
  fn is_expired(&self, now: u64) -> bool {
    self.ttl.is_some_and(|ttl| self.created_at.saturating_add(ttl) < now)
  }
}

fn now_secs() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}

fn validate_name(name: &str) -> Result<(), StashError> {
  let valid = !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\']);
  if valid {
    Ok(())
  } else {
    Err(StashError::InvalidName(name.to_string()))
  }
}

/// A [`StashBackend`] storing entries in a local directory.
#[derive(Debug, Clone)]
pub struct LocalStash {
  root: PathBuf,
}

impl LocalStash {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn entry_dir(&self, key: &HashKey) -> PathBuf {
    self.root.join(key.as_str())
  }

  /// The entry's metadata, `None` when absent or expired.
  fn read_meta(&self, key: &HashKey) -> Result<Option<StashMeta>, StashError> {
    let path = self.entry_dir(key).join(STASH_META_FILE);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    let meta: StashMeta = serde_json::from_str(&content)?;
    if meta.is_expired(now_secs()) {
      debug!(key = %key, "stash entry expired");
      return Ok(None);
    }
    Ok(Some(meta))
  }
}

impl StashBackend for LocalStash {
  /// True when the nearest existing ancestor of the root is a writable directory.
  fn can_create(&self) -> bool {
    let mut candidate = Some(self.root.as_path());
    while let Some(path) = candidate {
      if let Ok(metadata) = fs::metadata(path) {
        return metadata.is_dir() && !metadata.permissions().readonly();
      }
      candidate = path.parent();
    }
    false
  }

  fn find_by_key(&self, key: &HashKey) -> Result<Option<Box<dyn StashArtifacts>>, StashError> {
    Ok(self.read_meta(key)?.map(|meta| {
      Box::new(LocalArtifacts {
        dir: self.entry_dir(key),
        meta,
      }) as Box<dyn StashArtifacts>
    }))
  }

  fn begin_upload(&self, key: &HashKey) -> Result<Box<dyn StashBuilder>, StashError> {
    if !self.can_create() {
      return Err(StashError::ReadOnly);
    }
    if self.read_meta(key)?.is_some() {
      return Err(StashError::DuplicateKey(key.clone()));
    }

    fs::create_dir_all(&self.root)?;
    let staging = tempfile::Builder::new().prefix(".upload-").tempdir_in(&self.root)?;
    fs::create_dir(staging.path().join(FILES_DIR))?;

    Ok(Box::new(LocalBuilder {
      dest: self.entry_dir(key),
      staging,
      meta: StashMeta {
        key: key.clone(),
        description: None,
        ttl: None,
        created_at: now_secs(),
        files: BTreeMap::new(),
      },
    }))
  }
}

struct LocalArtifacts {
  dir: PathBuf,
  meta: StashMeta,
}

impl StashArtifacts for LocalArtifacts {
  fn key(&self) -> &HashKey {
    &self.meta.key
  }

  fn files(&self) -> Vec<String> {
    self.meta.files.keys().cloned().collect()
  }

  fn description(&self) -> Option<&str> {
    self.meta.description.as_deref()
  }

  fn ttl(&self) -> Option<Duration> {
    self.meta.ttl.map(Duration::from_secs)
  }

  fn restore(&self, name: &str, dest: &Path) -> Result<(), StashError> {
    let expected = self.meta.files.get(name).ok_or_else(|| StashError::MissingFile {
      key: self.meta.key.clone(),
      name: name.to_string(),
    })?;
    let source = self.dir.join(FILES_DIR).join(name);

    if hash_file(&source)? != *expected {
      return Err(StashError::Corrupt {
        key: self.meta.key.clone(),
        name: name.to_string(),
      });
    }

    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::copy(&source, dest)?;
    debug!(key = %self.meta.key, file = name, dest = ?dest, "restored stash file");
    Ok(())
  }
}

struct LocalBuilder {
  dest: PathBuf,
  staging: TempDir,
  meta: StashMeta,
}

impl StashBuilder for LocalBuilder {
  fn add_file(&mut self, name: &str, source: &Path) -> Result<(), StashError> {
    validate_name(name)?;
    let staged = self.staging.path().join(FILES_DIR).join(name);
    fs::copy(source, &staged)?;
    self.meta.files.insert(name.to_string(), hash_file(&staged)?);
    Ok(())
  }

  fn set_ttl(&mut self, ttl: Option<Duration>) {
    self.meta.ttl = ttl.map(|d| d.as_secs());
  }

  fn set_description(&mut self, description: &str) {
    self.meta.description = Some(description.to_string());
  }

  fn commit(self: Box<Self>) -> Result<(), StashError> {
    let content = serde_json::to_string_pretty(&self.meta)?;
    fs::write(self.staging.path().join(STASH_META_FILE), content)?;

    // An expired entry may still occupy the destination.
    if self.dest.exists() {
      fs::remove_dir_all(&self.dest)?;
    }
    match fs::rename(self.staging.path(), &self.dest) {
      Ok(()) => {}
      Err(_) if self.dest.join(STASH_META_FILE).exists() => {
        return Err(StashError::DuplicateKey(self.meta.key.clone()));
      }
      Err(e) => return Err(e.into()),
    }

    info!(key = %self.meta.key, files = self.meta.files.len(), "stashed artifacts");
    Ok(())
  }
}
