//! Actions: the atomic, potentially cacheable units of work a target produces.

pub mod kinds;
mod process;

pub use process::{ActionProcess, CommandQueue, ProcessStatus};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::export::ExportCommand;
use crate::session::{ActionId, TargetId};
use crate::util::hash::HashKey;

/// A piece of information folded into an action's hash key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashComponent {
  /// Opaque bytes, folded as-is.
  Data(Vec<u8>),
  /// A path, folded relative to the scope directory (inputs) or the build
  /// directory (outputs). Input file contents are folded too.
  File { path: PathBuf, input: bool },
}

impl HashComponent {
  pub fn data(bytes: impl AsRef<[u8]>) -> Self {
    HashComponent::Data(bytes.as_ref().to_vec())
  }
}

/// Identifier, then every input, then every output.
pub fn default_hash_components(action: &Action) -> Vec<HashComponent> {
  let mut components = vec![HashComponent::data(action.identifier())];
  components.extend(action.inputs().iter().map(|path| HashComponent::File {
    path: path.clone(),
    input: true,
  }));
  components.extend(action.outputs().iter().map(|path| HashComponent::File {
    path: path.clone(),
    input: false,
  }));
  components
}

/// Capability interface of an action kind.
pub trait ActionKind: Send + Sync + fmt::Debug {
  /// Short kind tag, e.g. `commands`.
  fn kind(&self) -> &'static str;

  /// Human readable description. `full` includes every command.
  fn display(&self, action: &Action, full: bool) -> String {
    let _ = full;
    action.identifier().to_string()
  }

  fn hash_components(&self, action: &Action) -> Vec<HashComponent> {
    default_hash_components(action)
  }

  /// Overrides the cache-based skip decision when `Some`.
  fn skippable(&self, action: &Action) -> Option<bool> {
    let _ = action;
    None
  }

  /// Start executing. Must return without blocking; must be called from
  /// within a tokio runtime.
  fn execute(&self, action: &Action) -> ActionProcess;

  /// Description for export backends. `None` exports a phony alias.
  fn export(&self, action: &Action) -> Option<ExportCommand> {
    let _ = action;
    None
  }
}

/// A unit of work produced by a target.
#[derive(Debug)]
pub struct Action {
  id: ActionId,
  target: TargetId,
  identifier: String,
  name: String,
  pure: bool,
  inputs: Vec<PathBuf>,
  outputs: Vec<PathBuf>,
  deps: Vec<ActionId>,
  kind: Arc<dyn ActionKind>,
  hash_key: OnceLock<HashKey>,
  completed: AtomicBool,
}

impl Action {
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn new(
    id: ActionId,
    target: TargetId,
    identifier: String,
    name: String,
    pure: bool,
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
    deps: Vec<ActionId>,
    kind: Arc<dyn ActionKind>,
  ) -> Self {
    Self {
      id,
      target,
      identifier,
      name,
      pure,
      inputs,
      outputs,
      deps,
      kind,
      hash_key: OnceLock::new(),
      completed: AtomicBool::new(false),
    }
  }

  pub fn id(&self) -> ActionId {
    self.id
  }

  /// The owning target.
  pub fn target(&self) -> TargetId {
    self.target
  }

  /// `//scope:name!action`
  pub fn identifier(&self) -> &str {
    &self.identifier
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Whether the result is a deterministic function of the hash components.
  pub fn is_pure(&self) -> bool {
    self.pure
  }

  /// Absolute input paths.
  pub fn inputs(&self) -> &[PathBuf] {
    &self.inputs
  }

  /// Absolute output paths.
  pub fn outputs(&self) -> &[PathBuf] {
    &self.outputs
  }

  /// Action-level dependencies; these determine execution order.
  pub fn deps(&self) -> &[ActionId] {
    &self.deps
  }

  pub fn kind(&self) -> &Arc<dyn ActionKind> {
    &self.kind
  }

  pub fn display(&self, full: bool) -> String {
    self.kind.display(self, full)
  }

  pub fn execute(&self) -> ActionProcess {
    self.kind.execute(self)
  }

  /// The memoized hash key, if one was computed.
  pub fn hash_key(&self) -> Option<&HashKey> {
    self.hash_key.get()
  }

  /// Store `key` unless a key is already memoized; returns the memoized key.
  pub(crate) fn memoize_key(&self, key: HashKey) -> &HashKey {
    self.hash_key.get_or_init(|| key)
  }

  pub fn is_completed(&self) -> bool {
    self.completed.load(Ordering::Acquire)
  }

  pub(crate) fn set_completed(&self, completed: bool) {
    self.completed.store(completed, Ordering::Release);
  }

  /// Whether every output exists on disk.
  pub fn outputs_exist(&self) -> bool {
    self.outputs.iter().all(|p| Path::exists(p))
  }
}
