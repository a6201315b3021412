//! Targets: declared build intent, translated into actions.
//!
//! A target is translated exactly once, after all of its dependencies. Its
//! [`TargetKind`] receives a [`Translator`], the explicit context through
//! which it registers actions on the session.

pub mod kinds;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::action::{Action, ActionKind};
use crate::graph::GraphError;
use crate::session::{ActionId, Scope, Session, TargetDecl, TargetId, action_identifier, is_valid_name};
use crate::util::path::absolutize;

/// Errors raised while translating targets into actions.
#[derive(Debug, Error)]
pub enum TranslateError {
  #[error("action '{action}' already exists in target {target}")]
  DuplicateAction { target: String, action: String },

  #[error("target {target} depends on {dependency}, which has not been translated")]
  NotTranslated { target: String, dependency: String },

  #[error("target {target} has no action named '{action}'")]
  UnknownAction { target: String, action: String },

  #[error("invalid action name '{0}'")]
  InvalidName(String),

  #[error("target {target}: {message}")]
  Invalid { target: String, message: String },

  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// Capability interface of a target kind.
pub trait TargetKind: Send + Sync + fmt::Debug {
  /// Short kind tag, e.g. `commands`.
  fn kind(&self) -> &'static str;

  /// Emit this target's actions through `tx`.
  fn translate(&self, tx: &mut Translator<'_>) -> Result<(), TranslateError>;
}

/// A unit of declared build intent.
#[derive(Debug)]
pub struct Target {
  id: TargetId,
  identifier: String,
  scope: String,
  name: String,
  directory: PathBuf,
  version: String,
  deps: Vec<TargetId>,
  visible_deps: Option<Vec<TargetId>>,
  kind: Arc<dyn TargetKind>,
  actions: Vec<ActionId>,
  translated: bool,
}

impl Target {
  pub(crate) fn new(id: TargetId, identifier: String, scope: &Scope, decl: TargetDecl) -> Self {
    Self {
      id,
      identifier,
      scope: decl.scope,
      name: decl.name,
      directory: scope.directory.clone(),
      version: scope.version.clone(),
      deps: decl.deps,
      visible_deps: decl.visible_deps,
      kind: decl.kind,
      actions: Vec::new(),
      translated: false,
    }
  }

  pub fn id(&self) -> TargetId {
    self.id
  }

  /// `//scope:name`
  pub fn identifier(&self) -> &str {
    &self.identifier
  }

  pub fn scope(&self) -> &str {
    &self.scope
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// The directory of the target's scope.
  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// The version of the target's scope.
  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn deps(&self) -> &[TargetId] {
    &self.deps
  }

  /// Dependencies exposed to downstream targets; `deps` when unset.
  pub fn visible_deps(&self) -> &[TargetId] {
    self.visible_deps.as_deref().unwrap_or(&self.deps)
  }

  pub fn kind(&self) -> &Arc<dyn TargetKind> {
    &self.kind
  }

  /// Actions in creation order.
  pub fn actions(&self) -> &[ActionId] {
    &self.actions
  }

  pub fn is_translated(&self) -> bool {
    self.translated
  }

  pub(crate) fn mark_translated(&mut self) {
    self.translated = true;
  }

  pub(crate) fn push_action(&mut self, id: ActionId) {
    self.actions.push(id);
  }
}

/// An action-level dependency requested by [`NewAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dep {
  /// Expands to the target's leaf actions.
  Target(TargetId),
  /// A specific action.
  Action(ActionId),
  /// An action of the translating target, by name.
  Local(String),
}

/// Parameters of [`Translator::new_action`].
#[derive(Debug, Clone)]
pub struct NewAction {
  pub name: String,
  pub kind: Arc<dyn ActionKind>,
  pub deps: Vec<Dep>,
  /// Relative paths resolve against the scope directory.
  pub inputs: Vec<PathBuf>,
  /// Relative paths resolve against the build directory.
  pub outputs: Vec<PathBuf>,
  pub pure: bool,
}

impl NewAction {
  pub fn new(name: impl Into<String>, kind: Arc<dyn ActionKind>) -> Self {
    Self {
      name: name.into(),
      kind,
      deps: Vec::new(),
      inputs: Vec::new(),
      outputs: Vec::new(),
      pure: false,
    }
  }

  pub fn deps(mut self, deps: impl IntoIterator<Item = Dep>) -> Self {
    self.deps = deps.into_iter().collect();
    self
  }

  pub fn inputs(mut self, inputs: impl IntoIterator<Item = PathBuf>) -> Self {
    self.inputs = inputs.into_iter().collect();
    self
  }

  pub fn outputs(mut self, outputs: impl IntoIterator<Item = PathBuf>) -> Self {
    self.outputs = outputs.into_iter().collect();
    self
  }

  pub fn pure(mut self, pure: bool) -> Self {
    self.pure = pure;
    self
  }
}

/// Context handed to [`TargetKind::translate`].
pub struct Translator<'s> {
  session: &'s mut Session,
  target: TargetId,
}

impl<'s> Translator<'s> {
  pub(crate) fn new(session: &'s mut Session, target: TargetId) -> Self {
    Self { session, target }
  }

  pub fn session(&self) -> &Session {
    self.session
  }

  pub fn target(&self) -> &Target {
    self.session.target(self.target)
  }

  pub fn directory(&self) -> &Path {
    self.target().directory()
  }

  pub fn build_dir(&self) -> &Path {
    self.session.build_dir()
  }

  /// The target's direct and visible dependencies as action dependencies.
  pub fn dep_targets(&self) -> Vec<Dep> {
    let target = self.target();
    let mut seen = HashSet::new();
    target
      .deps()
      .iter()
      .chain(target.visible_deps())
      .filter(|t| seen.insert(**t))
      .map(|t| Dep::Target(*t))
      .collect()
  }

  /// See [`Session::transitive_deps`].
  pub fn transitive_deps(&self) -> Vec<TargetId> {
    self.session.transitive_deps(self.target)
  }

  /// A kind-specific translation error for this target.
  pub fn invalid(&self, message: impl Into<String>) -> TranslateError {
    TranslateError::Invalid {
      target: self.target().identifier().to_string(),
      message: message.into(),
    }
  }

  /// Create an action on the translating target and register it on the session.
  pub fn new_action(&mut self, spec: NewAction) -> Result<ActionId, TranslateError> {
    if !is_valid_name(&spec.name) {
      return Err(TranslateError::InvalidName(spec.name));
    }

    let target = self.target();
    let identifier = action_identifier(target.identifier(), &spec.name);
    if self.session.find_action(&identifier).is_some() {
      return Err(TranslateError::DuplicateAction {
        target: target.identifier().to_string(),
        action: spec.name,
      });
    }

    let mut deps: Vec<ActionId> = Vec::new();
    for dep in &spec.deps {
      match dep {
        Dep::Target(id) => {
          let dep_target = self.session.target(*id);
          if !dep_target.is_translated() {
            return Err(TranslateError::NotTranslated {
              target: target.identifier().to_string(),
              dependency: dep_target.identifier().to_string(),
            });
          }
          deps.extend(self.session.leaf_actions(*id));
        }
        Dep::Action(id) => deps.push(*id),
        Dep::Local(name) => {
          let local = self
            .session
            .find_action(&action_identifier(target.identifier(), name))
            .ok_or_else(|| TranslateError::UnknownAction {
              target: target.identifier().to_string(),
              action: name.clone(),
            })?;
          deps.push(local);
        }
      }
    }
    let mut seen = HashSet::new();
    deps.retain(|d| seen.insert(*d));

    let inputs = spec.inputs.iter().map(|p| absolutize(p, target.directory())).collect();
    let outputs = spec.outputs.iter().map(|p| absolutize(p, self.session.build_dir())).collect();

    let action = Action::new(
      self.session.next_action_id(),
      self.target,
      identifier,
      spec.name,
      spec.pure,
      inputs,
      outputs,
      deps,
      spec.kind,
    );
    Ok(self.session.push_action(action))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::action::kinds::NullAction;
  use crate::session::Scope;
  use tempfile::TempDir;

  /// Emits a fixed chain of null actions.
  #[derive(Debug)]
  struct Chain(Vec<(&'static str, Vec<Dep>)>);

  impl TargetKind for Chain {
    fn kind(&self) -> &'static str {
      "chain"
    }

    fn translate(&self, tx: &mut Translator<'_>) -> Result<(), TranslateError> {
      for (name, deps) in &self.0 {
        tx.new_action(NewAction::new(*name, Arc::new(NullAction)).deps(deps.clone()))?;
      }
      Ok(())
    }
  }

  fn session(temp: &TempDir) -> Session {
    let mut session = Session::new(temp.path().join("build"));
    session.register_scope(Scope::new("demo", temp.path(), "1")).unwrap();
    session
  }

  #[test]
  fn leaf_actions_exclude_internal_dependencies() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let id = session
      .declare_target(TargetDecl::new(
        "demo",
        "t",
        Arc::new(Chain(vec![
          ("compile", vec![]),
          ("link", vec![Dep::Local("compile".into())]),
          ("docs", vec![]),
        ])),
      ))
      .unwrap();
    session.translate_target(id).unwrap();

    let leafs: Vec<&str> = session
      .leaf_actions(id)
      .into_iter()
      .map(|a| session.action(a).name())
      .collect();
    assert_eq!(leafs, vec!["link", "docs"]);
  }

  #[test]
  fn duplicate_action_name_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let id = session
      .declare_target(TargetDecl::new(
        "demo",
        "t",
        Arc::new(Chain(vec![("a", vec![]), ("a", vec![])])),
      ))
      .unwrap();

    let err = session.translate_target(id).unwrap_err();
    assert!(matches!(err, TranslateError::DuplicateAction { action, .. } if action == "a"));
  }

  #[test]
  fn unknown_local_dependency_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let id = session
      .declare_target(TargetDecl::new(
        "demo",
        "t",
        Arc::new(Chain(vec![("a", vec![Dep::Local("missing".into())])])),
      ))
      .unwrap();

    assert!(matches!(
      session.translate_target(id),
      Err(TranslateError::UnknownAction { .. })
    ));
  }

  #[test]
  fn translating_before_dependencies_fails() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let dep = session
      .declare_target(TargetDecl::new("demo", "dep", Arc::new(Chain(vec![("a", vec![])]))))
      .unwrap();
    let id = session
      .declare_target(TargetDecl::new("demo", "t", Arc::new(Chain(vec![]))).deps([dep]))
      .unwrap();

    let err = session.translate_target(id).unwrap_err();
    assert!(matches!(err, TranslateError::NotTranslated { dependency, .. } if dependency == "//demo:dep"));
  }

  #[test]
  fn target_dependency_expands_to_leaf_actions() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let lib = session
      .declare_target(TargetDecl::new(
        "demo",
        "lib",
        Arc::new(Chain(vec![("compile", vec![]), ("link", vec![Dep::Local("compile".into())])])),
      ))
      .unwrap();
    let app = session
      .declare_target(TargetDecl::new("demo", "app", Arc::new(Chain(vec![]))).deps([lib]))
      .unwrap();
    session.translate_target(lib).unwrap();
    session.translate_target(app).unwrap();

    let mut tx = Translator::new(&mut session, app);
    let deps = tx.dep_targets();
    let id = tx.new_action(NewAction::new("run", Arc::new(NullAction)).deps(deps)).unwrap();

    let link = session.find_action("//demo:lib!link").unwrap();
    assert_eq!(session.action(id).deps(), &[link]);
  }

  #[test]
  fn paths_resolve_against_scope_and_build_dirs() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let id = session
      .declare_target(TargetDecl::new("demo", "t", Arc::new(Chain(vec![]))))
      .unwrap();
    session.translate_target(id).unwrap();

    let mut tx = Translator::new(&mut session, id);
    let action = tx
      .new_action(
        NewAction::new("gen", Arc::new(NullAction))
          .inputs([PathBuf::from("src/a.txt")])
          .outputs([PathBuf::from("gen/out.txt")]),
      )
      .unwrap();

    let action = session.action(action);
    assert!(action.inputs()[0].starts_with(session.target(id).directory()));
    assert!(action.inputs()[0].ends_with("src/a.txt"));
    assert!(action.outputs()[0].starts_with(session.build_dir()));
  }
}
