//! Hashing utilities for content-addressed keys and verification.
//!
//! This module provides:
//! - `HashKey`: the hex digest identifying an action's hash components
//! - `update_from_file()` / `update_from_reader()`: streaming content into a digest
//! - `hash_file()`: single file hashing

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Size of the buffer used when streaming file content into a digest.
const CHUNK_SIZE: usize = 8192;

/// A content-addressed key computed from an action's hash components.
///
/// # Format
///
/// The key is a lowercase hexadecimal SHA-256 digest (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashKey(pub String);

impl HashKey {
  /// Finalize a digest into a key.
  pub fn from_digest(hasher: Sha256) -> Self {
    HashKey(hex::encode(hasher.finalize()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for HashKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Stream everything `reader` yields into `hasher`.
///
/// Returns the number of bytes consumed.
pub fn update_from_reader(hasher: &mut Sha256, mut reader: impl Read) -> io::Result<u64> {
  let mut buffer = [0u8; CHUNK_SIZE];
  let mut total = 0u64;

  loop {
    let bytes_read = match reader.read(&mut buffer) {
      Ok(0) => break,
      Ok(n) => n,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    };
    hasher.update(&buffer[..bytes_read]);
    total += bytes_read as u64;
  }

  Ok(total)
}

/// Stream a file's content into `hasher`.
pub fn update_from_file(hasher: &mut Sha256, path: &Path) -> io::Result<u64> {
  let file = fs::File::open(path)?;
  update_from_reader(hasher, file)
}

/// Hash a file's contents.
///
/// Returns the full 64-character SHA256 hash of the file.
pub fn hash_file(path: &Path) -> io::Result<String> {
  let mut hasher = Sha256::new();
  update_from_file(&mut hasher, path)?;
  Ok(hex::encode(hasher.finalize()))
}
