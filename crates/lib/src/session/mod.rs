//! Build session: the arena that owns every scope, target and action.
//!
//! Targets and actions refer to each other through [`TargetId`] and
//! [`ActionId`] handles into the session rather than through owning
//! pointers. Nothing is removed from a session once declared.

mod graph;

pub use graph::{ActionGraph, TargetGraph};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::action::Action;
use crate::graph::GraphError;
use crate::target::{Target, TargetKind, TranslateError, Translator};
use crate::util::path::absolutize;

/// Handle to a target owned by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(usize);

impl TargetId {
  pub fn index(self) -> usize {
    self.0
  }
}

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "target#{}", self.0)
  }
}

/// Handle to an action owned by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(usize);

impl ActionId {
  pub fn index(self) -> usize {
    self.0
  }
}

impl fmt::Display for ActionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "action#{}", self.0)
  }
}

/// Errors raised while declaring scopes and targets.
#[derive(Debug, Error)]
pub enum SessionError {
  #[error("scope '{name}' is already registered with a different directory or version")]
  ScopeMismatch { name: String },

  #[error("unknown scope: {0}")]
  UnknownScope(String),

  #[error("invalid target reference '{0}'")]
  InvalidReference(String),

  #[error("target {0} is already declared")]
  DuplicateTarget(String),

  #[error("no such target: {0}")]
  UnknownTarget(String),

  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// The namespace a target is declared in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
  /// Scope name, e.g. `demo` or `libs/util`.
  pub name: String,
  /// Directory relative input paths resolve against.
  pub directory: PathBuf,
  /// Scope version, folded into hash keys of the scope's actions.
  pub version: String,
}

impl Scope {
  pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>, version: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      directory: directory.into(),
      version: version.into(),
    }
  }
}

/// A parsed `[//scope]:name` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
  pub scope: Option<String>,
  pub name: String,
}

impl TargetRef {
  /// Parse `//scope:name`, `:name` or a bare `name`.
  pub fn parse(s: &str) -> Result<Self, SessionError> {
    let invalid = || SessionError::InvalidReference(s.to_string());

    let (scope, name) = if let Some(rest) = s.strip_prefix("//") {
      let (scope, name) = rest.split_once(':').ok_or_else(invalid)?;
      (Some(scope), name)
    } else if let Some(name) = s.strip_prefix(':') {
      (None, name)
    } else {
      (None, s)
    };

    if scope.is_some_and(|scope| !is_valid_scope_name(scope)) {
      return Err(invalid());
    }
    if !is_valid_name(name) {
      return Err(invalid());
    }

    Ok(Self {
      scope: scope.map(str::to_string),
      name: name.to_string(),
    })
  }

  /// The full target identifier, using `current_scope` when none was given.
  pub fn identifier(&self, current_scope: &str) -> String {
    target_identifier(self.scope.as_deref().unwrap_or(current_scope), &self.name)
  }
}

impl fmt::Display for TargetRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.scope {
      Some(scope) => write!(f, "//{}:{}", scope, self.name),
      None => write!(f, ":{}", self.name),
    }
  }
}

/// `//scope:name`
pub fn target_identifier(scope: &str, name: &str) -> String {
  format!("//{}:{}", scope, name)
}

/// `//scope:name!action`
pub fn action_identifier(target: &str, action: &str) -> String {
  format!("{}!{}", target, action)
}

/// Target and action names: non-empty, no separators or whitespace.
pub fn is_valid_name(name: &str) -> bool {
  !name.is_empty() && !name.chars().any(|c| matches!(c, ':' | '!' | '/' | '\\') || c.is_whitespace())
}

fn is_valid_scope_name(name: &str) -> bool {
  !name.is_empty()
    && !name.starts_with('/')
    && !name.ends_with('/')
    && !name.chars().any(|c| matches!(c, ':' | '!' | '\\') || c.is_whitespace())
}

/// Front-end registration of a target.
#[derive(Debug, Clone)]
pub struct TargetDecl {
  pub scope: String,
  pub name: String,
  /// Ordering-only dependencies.
  pub deps: Vec<TargetId>,
  /// Dependencies exposed to downstream targets. Defaults to `deps`.
  pub visible_deps: Option<Vec<TargetId>>,
  pub kind: Arc<dyn TargetKind>,
}

impl TargetDecl {
  pub fn new(scope: impl Into<String>, name: impl Into<String>, kind: Arc<dyn TargetKind>) -> Self {
    Self {
      scope: scope.into(),
      name: name.into(),
      deps: Vec::new(),
      visible_deps: None,
      kind,
    }
  }

  pub fn deps(mut self, deps: impl IntoIterator<Item = TargetId>) -> Self {
    self.deps = deps.into_iter().collect();
    self
  }

  pub fn visible_deps(mut self, deps: impl IntoIterator<Item = TargetId>) -> Self {
    self.visible_deps = Some(deps.into_iter().collect());
    self
  }
}

/// Owns every scope, target and action of one build.
#[derive(Debug)]
pub struct Session {
  build_dir: PathBuf,
  options: BTreeMap<String, String>,
  scopes: BTreeMap<String, Scope>,
  targets: Vec<Target>,
  actions: Vec<Action>,
  target_index: HashMap<String, TargetId>,
  action_index: HashMap<String, ActionId>,
}

impl Session {
  /// Create a session writing outputs below `build_dir`.
  ///
  /// Relative paths resolve against the current directory.
  pub fn new(build_dir: impl AsRef<Path>) -> Self {
    Self {
      build_dir: resolve_dir(build_dir.as_ref()),
      options: BTreeMap::new(),
      scopes: BTreeMap::new(),
      targets: Vec::new(),
      actions: Vec::new(),
      target_index: HashMap::new(),
      action_index: HashMap::new(),
    }
  }

  pub fn with_options(mut self, options: BTreeMap<String, String>) -> Self {
    self.options = options;
    self
  }

  pub fn build_dir(&self) -> &Path {
    &self.build_dir
  }

  /// The active option set, recorded in the build state.
  pub fn options(&self) -> &BTreeMap<String, String> {
    &self.options
  }

  /// Register a scope. Re-registering an identical scope is a no-op.
  pub fn register_scope(&mut self, scope: Scope) -> Result<(), SessionError> {
    if !is_valid_scope_name(&scope.name) {
      return Err(SessionError::InvalidReference(scope.name));
    }

    let scope = Scope {
      directory: resolve_dir(&scope.directory),
      ..scope
    };

    if let Some(existing) = self.scopes.get(&scope.name) {
      if *existing == scope {
        return Ok(());
      }
      return Err(SessionError::ScopeMismatch { name: scope.name });
    }

    debug!(scope = %scope.name, directory = ?scope.directory, "registered scope");
    self.scopes.insert(scope.name.clone(), scope);
    Ok(())
  }

  pub fn scope(&self, name: &str) -> Option<&Scope> {
    self.scopes.get(name)
  }

  pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
    self.scopes.values()
  }

  /// Register a target. Its scope must already be registered.
  pub fn declare_target(&mut self, decl: TargetDecl) -> Result<TargetId, SessionError> {
    let scope = self
      .scopes
      .get(&decl.scope)
      .ok_or_else(|| SessionError::UnknownScope(decl.scope.clone()))?;

    if !is_valid_name(&decl.name) {
      return Err(SessionError::InvalidReference(decl.name));
    }

    let identifier = target_identifier(&decl.scope, &decl.name);
    if self.target_index.contains_key(&identifier) {
      return Err(SessionError::DuplicateTarget(identifier));
    }

    let id = TargetId(self.targets.len());
    let target = Target::new(id, identifier.clone(), scope, decl);
    debug!(target = %identifier, kind = target.kind().kind(), "declared target");

    self.targets.push(target);
    self.target_index.insert(identifier, id);
    Ok(id)
  }

  pub fn target(&self, id: TargetId) -> &Target {
    &self.targets[id.0]
  }

  pub fn targets(&self) -> impl Iterator<Item = &Target> {
    self.targets.iter()
  }

  pub fn action(&self, id: ActionId) -> &Action {
    &self.actions[id.0]
  }

  pub fn actions(&self) -> impl Iterator<Item = &Action> {
    self.actions.iter()
  }

  /// Look up a target by its full identifier.
  pub fn find_target(&self, identifier: &str) -> Option<TargetId> {
    self.target_index.get(identifier).copied()
  }

  /// Look up an action by its full identifier.
  pub fn find_action(&self, identifier: &str) -> Option<ActionId> {
    self.action_index.get(identifier).copied()
  }

  /// Resolve a reference relative to `current_scope`.
  pub fn resolve(&self, reference: &TargetRef, current_scope: &str) -> Result<TargetId, SessionError> {
    let identifier = reference.identifier(current_scope);
    self
      .find_target(&identifier)
      .ok_or(SessionError::UnknownTarget(identifier))
  }

  /// Parse and resolve a reference string.
  pub fn resolve_str(&self, reference: &str, current_scope: &str) -> Result<TargetId, SessionError> {
    self.resolve(&TargetRef::parse(reference)?, current_scope)
  }

  /// Direct deps plus the transitive closure of visible deps, in first-seen order.
  pub fn transitive_deps(&self, id: TargetId) -> Vec<TargetId> {
    let target = self.target(id);
    let mut result = Vec::new();
    let mut seen = HashSet::new();
    let mut expanded = HashSet::new();

    let direct: Vec<TargetId> = target.deps().iter().chain(target.visible_deps()).copied().collect();
    for dep in &direct {
      if seen.insert(*dep) {
        result.push(*dep);
      }
    }
    for dep in &direct {
      self.collect_visible(*dep, &mut result, &mut seen, &mut expanded);
    }
    result
  }

  fn collect_visible(
    &self,
    id: TargetId,
    result: &mut Vec<TargetId>,
    seen: &mut HashSet<TargetId>,
    expanded: &mut HashSet<TargetId>,
  ) {
    if !expanded.insert(id) {
      return;
    }
    let visible = self.target(id).visible_deps();
    for dep in visible {
      if seen.insert(*dep) {
        result.push(*dep);
      }
    }
    for dep in visible {
      self.collect_visible(*dep, result, seen, expanded);
    }
  }

  /// Actions of `target` that no other action of the same target depends on.
  pub fn leaf_actions(&self, target: TargetId) -> Vec<ActionId> {
    let own = self.target(target).actions();
    let depended_on: HashSet<ActionId> = own.iter().flat_map(|a| self.action(*a).deps().iter().copied()).collect();
    own.iter().copied().filter(|a| !depended_on.contains(a)).collect()
  }

  /// Translate a single target.
  ///
  /// Every direct and visible dependency must already be translated.
  /// Translating an already translated target is a no-op.
  pub fn translate_target(&mut self, id: TargetId) -> Result<(), TranslateError> {
    let target = self.target(id);
    if target.is_translated() {
      debug!(target = %target.identifier(), "already translated");
      return Ok(());
    }

    for dep in target.deps().iter().chain(target.visible_deps()) {
      let dep = self.target(*dep);
      if !dep.is_translated() {
        return Err(TranslateError::NotTranslated {
          target: target.identifier().to_string(),
          dependency: dep.identifier().to_string(),
        });
      }
    }

    let kind = Arc::clone(target.kind());
    kind.translate(&mut Translator::new(self, id))?;

    let target = &mut self.targets[id.0];
    target.mark_translated();
    debug!(target = %target.identifier(), actions = target.actions().len(), "translated target");
    Ok(())
  }

  pub(crate) fn next_action_id(&self) -> ActionId {
    ActionId(self.actions.len())
  }

  pub(crate) fn push_action(&mut self, action: Action) -> ActionId {
    let id = action.id();
    let target = action.target();
    self.action_index.insert(action.identifier().to_string(), id);
    self.actions.push(action);
    self.targets[target.0].push_action(id);
    id
  }
}

/// Absolutize against the current directory and canonicalize the longest
/// existing prefix, so directories that do not exist yet resolve the same way
/// they will once created.
fn resolve_dir(path: &Path) -> PathBuf {
  let cwd = std::env::current_dir().unwrap_or_default();
  let absolute = absolutize(path, &cwd);

  let mut existing = absolute.as_path();
  let mut missing = Vec::new();
  loop {
    if let Ok(mut canonical) = dunce::canonicalize(existing) {
      for name in missing.iter().rev() {
        canonical.push(name);
      }
      return canonical;
    }
    match (existing.parent(), existing.file_name()) {
      (Some(parent), Some(name)) => {
        missing.push(name.to_os_string());
        existing = parent;
      }
      _ => return absolute,
    }
  }
}
