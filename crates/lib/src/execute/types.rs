//! Types for action graph execution.
//!
//! This module defines the error type, the build summary, the interrupt flag
//! and the configuration of the execution engine.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::cache::CacheError;
use crate::consts::{DEFAULT_POLL_INTERVAL_MS, EXIT_INTERRUPTED, NATIVE_BACKEND};
use crate::graph::GraphError;
use crate::hash::HashError;
use crate::stash::StashBackend;

/// Errors that end a build.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// An action exited non-zero. The rest of the build was cancelled.
  #[error("{action} failed with exit code {code}: {command}")]
  ActionFailed {
    action: String,
    command: String,
    code: i32,
    output: String,
  },

  /// The user interrupted the build. In-flight actions were terminated.
  #[error("build interrupted by user")]
  Interrupted,

  /// An action depends on an action outside the executed graph.
  #[error("{action} depends on {dependency}, which is not part of the action graph")]
  MissingDependency { action: String, dependency: String },

  #[error("failed to create build directory {path}")]
  BuildDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to remove {path}")]
  Clean {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error(transparent)]
  Cache(#[from] CacheError),
}

impl ExecuteError {
  /// Process exit code for this error.
  pub fn exit_code(&self) -> i32 {
    match self {
      ExecuteError::ActionFailed { code, .. } => *code,
      ExecuteError::Interrupted => EXIT_INTERRUPTED,
      _ => 1,
    }
  }
}

/// Cooperative cancellation flag shared between the engine and a signal handler.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn trigger(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_triggered(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Result of a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
  /// Actions that ran, in completion order.
  pub executed: Vec<String>,
  /// Actions that were up to date.
  pub skipped: Vec<String>,
  /// Actions whose outputs were restored from the stash.
  pub restored: Vec<String>,
  pub elapsed: Duration,
}

impl BuildSummary {
  pub fn total(&self) -> usize {
    self.executed.len() + self.skipped.len() + self.restored.len()
  }
}

/// Configuration for the execution engine.
#[derive(Clone)]
pub struct ExecuteConfig {
  /// Sleep between polls of in-flight actions.
  pub poll_interval: Duration,
  /// Backend name recorded in the build state.
  pub backend: String,
  /// Optional artifact cache consulted for pure actions.
  pub stash: Option<Arc<dyn StashBackend>>,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
      backend: NATIVE_BACKEND.to_string(),
      stash: None,
    }
  }
}

impl fmt::Debug for ExecuteConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExecuteConfig")
      .field("poll_interval", &self.poll_interval)
      .field("backend", &self.backend)
      .field("stash", &self.stash.is_some())
      .finish()
  }
}

/// Parse `key=value` option assignments. `key` alone means `true`; `key=`
/// removes the key from `base`.
pub fn merge_options<'a>(
  base: &BTreeMap<String, String>,
  assignments: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<String, String> {
  let mut merged = base.clone();
  for assignment in assignments {
    match assignment.split_once('=') {
      Some((key, "")) => {
        merged.remove(key.trim());
      }
      Some((key, value)) => {
        merged.insert(key.trim().to_string(), value.to_string());
      }
      None => {
        merged.insert(assignment.trim().to_string(), "true".to_string());
      }
    }
  }
  merged
}
