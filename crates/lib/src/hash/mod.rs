//! Content-addressable action keys.
//!
//! A key is a SHA-256 over the tool version, the scope version and every
//! [`HashComponent`] the action's kind yields. File components contribute
//! their path relative to the scope directory (inputs) or the build directory
//! (outputs), so keys survive moving the whole checkout. Input files also
//! contribute their current contents.

use std::fs::File;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::action::HashComponent;
use crate::consts::TOOL_VERSION;
use crate::session::{ActionId, Session};
use crate::util::hash::{HashKey, update_from_reader};
use crate::util::path::{relative_to, to_slash};

const CONTENT_ABSENT: u8 = 0x00;
const CONTENT_PRESENT: u8 = 0x01;

/// Precondition violations when computing a key. These are programming errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
  #[error("action {action} is not pure and has no hash key")]
  NotPure { action: String },

  #[error("cannot hash {action}: dependency {dependency} has not completed")]
  DependenciesIncomplete { action: String, dependency: String },
}

/// Compute (or return the memoized) hash key of a pure action.
///
/// Every action-level dependency must have completed. Unreadable input files
/// contribute their path but no content.
pub fn compute_key(session: &Session, id: ActionId) -> Result<HashKey, HashError> {
  let action = session.action(id);
  if let Some(key) = action.hash_key() {
    return Ok(key.clone());
  }

  if !action.is_pure() {
    return Err(HashError::NotPure {
      action: action.identifier().to_string(),
    });
  }
  if let Some(dep) = action.deps().iter().map(|d| session.action(*d)).find(|d| !d.is_completed()) {
    return Err(HashError::DependenciesIncomplete {
      action: action.identifier().to_string(),
      dependency: dep.identifier().to_string(),
    });
  }

  let target = session.target(action.target());
  let mut hasher = Sha256::new();
  fold(&mut hasher, TOOL_VERSION.as_bytes());
  fold(&mut hasher, target.version().as_bytes());

  for component in action.kind().hash_components(action) {
    match component {
      HashComponent::Data(bytes) => fold(&mut hasher, &bytes),
      HashComponent::File { path, input } => {
        let base = if input { target.directory() } else { session.build_dir() };
        let relative = to_slash(&relative_to(&path, base));
        fold(&mut hasher, relative.as_bytes());

        if input {
          fold_content(&mut hasher, &path, action.identifier());
        }
      }
    }
  }

  let key = HashKey::from_digest(hasher);
  debug!(action = %action.identifier(), key = %key, "computed hash key");
  Ok(action.memoize_key(key).clone())
}

/// Length-prefixed so adjacent components cannot run together.
fn fold(hasher: &mut Sha256, bytes: &[u8]) {
  hasher.update((bytes.len() as u64).to_le_bytes());
  hasher.update(bytes);
}

/// Input content is tagged present or absent and followed by its length, so an
/// empty file and a missing one hash differently.
fn fold_content(hasher: &mut Sha256, path: &Path, action: &str) {
  match update_from_file_tagged(hasher, path) {
    Ok(len) => hasher.update(len.to_le_bytes()),
    Err(err) => {
      debug!(action, path = ?path, error = %err, "input not hashed");
      hasher.update([CONTENT_ABSENT]);
    }
  }
}

fn update_from_file_tagged(hasher: &mut Sha256, path: &Path) -> std::io::Result<u64> {
  let file = File::open(path)?;
  hasher.update([CONTENT_PRESENT]);
  update_from_reader(hasher, file)
}
