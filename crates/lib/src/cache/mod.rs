//! Persisted build state and the incremental skip decision.
//!
//! # Storage Layout
//!
//! ```text
//! {build_dir}/kiln-state.json
//! {
//!   "version": 1,
//!   "backend": "native",
//!   "options": { "profile": "debug" },
//!   "actions": { "//demo:gen!run": { "key": "3f2a..." } }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::{STATE_FILE_NAME, STATE_VERSION};
use crate::hash::{HashError, compute_key};
use crate::session::{ActionId, Session};
use crate::util::hash::HashKey;

/// Errors reading or writing the state file.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to read state file {path}: {source}")]
  Read { path: PathBuf, source: io::Error },

  #[error("failed to parse state file {path}: {source}")]
  Parse { path: PathBuf, source: serde_json::Error },

  #[error("unsupported state file version {0}")]
  UnsupportedVersion(u32),

  #[error("failed to serialize state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write state file {path}: {source}")]
  Write { path: PathBuf, source: io::Error },
}

/// What is remembered about one action between builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
  pub key: HashKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StateFile {
  version: u32,
  #[serde(default)]
  backend: Option<String>,
  #[serde(default)]
  options: BTreeMap<String, String>,
  #[serde(default)]
  actions: BTreeMap<String, ActionRecord>,
}

impl Default for StateFile {
  fn default() -> Self {
    Self {
      version: STATE_VERSION,
      backend: None,
      options: BTreeMap::new(),
      actions: BTreeMap::new(),
    }
  }
}

#[derive(Deserialize)]
struct VersionProbe {
  version: u32,
}

/// Map from action identifier to the last recorded hash key, plus the
/// backend and option set of the previous build.
#[derive(Debug, Clone)]
pub struct CacheStore {
  path: PathBuf,
  state: StateFile,
}

impl CacheStore {
  /// An empty store that will be written into `build_dir`.
  pub fn new(build_dir: &Path) -> Self {
    Self {
      path: build_dir.join(STATE_FILE_NAME),
      state: StateFile::default(),
    }
  }

  /// Load the state of `build_dir`. A missing file is an empty state.
  pub fn load(build_dir: &Path) -> Result<Self, CacheError> {
    let path = build_dir.join(STATE_FILE_NAME);

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = ?path, "no state file, starting empty");
        return Ok(Self::new(build_dir));
      }
      Err(source) => return Err(CacheError::Read { path, source }),
    };

    let probe: VersionProbe = match serde_json::from_str(&content) {
      Ok(probe) => probe,
      Err(source) => return Err(CacheError::Parse { path, source }),
    };
    if probe.version != STATE_VERSION {
      return Err(CacheError::UnsupportedVersion(probe.version));
    }

    let state = match serde_json::from_str(&content) {
      Ok(state) => state,
      Err(source) => return Err(CacheError::Parse { path, source }),
    };
    Ok(Self { path, state })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn last_key(&self, identifier: &str) -> Option<&HashKey> {
    self.state.actions.get(identifier).map(|r| &r.key)
  }

  pub fn record(&mut self, identifier: &str, key: HashKey) {
    self.state.actions.insert(identifier.to_string(), ActionRecord { key });
  }

  pub fn forget(&mut self, identifier: &str) -> bool {
    self.state.actions.remove(identifier).is_some()
  }

  pub fn backend(&self) -> Option<&str> {
    self.state.backend.as_deref()
  }

  pub fn options(&self) -> &BTreeMap<String, String> {
    &self.state.options
  }

  pub fn len(&self) -> usize {
    self.state.actions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.state.actions.is_empty()
  }

  /// Record the current backend and options. When either differs from the
  /// previous build, every action key is discarded. Returns whether keys
  /// were discarded.
  pub fn reconcile(&mut self, backend: &str, options: &BTreeMap<String, String>) -> bool {
    let backend_changed = self.state.backend.as_deref().is_some_and(|b| b != backend);
    let options_changed = self.state.backend.is_some() && self.state.options != *options;

    let reset = (backend_changed || options_changed) && !self.state.actions.is_empty();
    if reset {
      warn!(
        previous_backend = self.state.backend.as_deref().unwrap_or("none"),
        backend,
        discarded = self.state.actions.len(),
        "backend or options changed, discarding cached action keys"
      );
      self.state.actions.clear();
    }

    self.state.backend = Some(backend.to_string());
    self.state.options = options.clone();
    reset
  }

  /// Drop records of actions not in `keep`. Returns how many were dropped.
  pub fn prune<'a>(&mut self, keep: impl IntoIterator<Item = &'a str>) -> usize {
    let keep: HashSet<&str> = keep.into_iter().collect();
    let before = self.state.actions.len();
    self.state.actions.retain(|id, _| keep.contains(id.as_str()));
    let pruned = before - self.state.actions.len();
    if pruned > 0 {
      debug!(pruned, "pruned stale action records");
    }
    pruned
  }

  /// Write the state atomically (temp file in the same directory, then rename).
  pub fn save(&self) -> Result<(), CacheError> {
    let write_err = |source| CacheError::Write {
      path: self.path.clone(),
      source,
    };
    let dir = self.path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(write_err)?;

    let content = serde_json::to_string_pretty(&self.state).map_err(CacheError::Serialize)?;
    let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(content.as_bytes()).map_err(write_err)?;
    temp.persist(&self.path).map_err(|e| write_err(e.error))?;

    debug!(path = ?self.path, actions = self.state.actions.len(), "saved build state");
    Ok(())
  }
}

/// Whether `id` can be skipped.
///
/// A kind-level override decides first. Otherwise impure actions never skip;
/// pure actions skip when their key matches the recorded one and every
/// declared output exists.
pub fn skippable(session: &Session, id: ActionId, store: &CacheStore) -> Result<bool, HashError> {
  let action = session.action(id);
  if let Some(decided) = action.kind().skippable(action) {
    return Ok(decided);
  }
  if !action.is_pure() {
    return Ok(false);
  }

  let key = compute_key(session, id)?;
  match store.last_key(action.identifier()) {
    Some(last) if *last == key => {}
    Some(_) => {
      debug!(action = %action.identifier(), "hash key changed");
      return Ok(false);
    }
    None => {
      debug!(action = %action.identifier(), "no recorded hash key");
      return Ok(false);
    }
  }

  if let Some(missing) = action.outputs().iter().find(|p| !p.exists()) {
    debug!(action = %action.identifier(), output = ?missing, "output missing");
    return Ok(false);
  }
  Ok(true)
}
