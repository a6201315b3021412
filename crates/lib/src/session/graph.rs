//! Target and action graphs: [`DirectedGraph`] specialized by identifier.

use std::collections::HashSet;

use tracing::info;

use super::{ActionId, Session, TargetId};
use crate::graph::{DirectedGraph, GraphError};
use crate::target::TranslateError;

/// Targets keyed by `//scope:name`, with an edge from every dependency to its dependent.
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
  graph: DirectedGraph<String, TargetId>,
}

impl TargetGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every target of the session.
  pub fn from_session(session: &Session) -> Result<Self, GraphError> {
    let mut graph = Self::new();
    for target in session.targets() {
      graph.add(session, target.id(), true)?;
    }
    Ok(graph)
  }

  /// The given targets and everything they depend on.
  pub fn select(session: &Session, targets: &[TargetId]) -> Result<Self, GraphError> {
    let mut graph = Self::new();
    for target in targets {
      graph.add(session, *target, true)?;
    }
    Ok(graph)
  }

  /// Insert a target. With `recursive`, its deps and visible deps are
  /// inserted and connected too.
  pub fn add(&mut self, session: &Session, id: TargetId, recursive: bool) -> Result<(), GraphError> {
    self.graph.add(session.target(id).identifier().to_string(), id)?;
    if !recursive {
      return Ok(());
    }

    let mut stack = vec![id];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
      if !visited.insert(current) {
        continue;
      }
      let target = session.target(current);
      let key = target.identifier().to_string();
      for dep in target.deps().iter().chain(target.visible_deps()) {
        let dep_key = session.target(*dep).identifier().to_string();
        self.graph.add(dep_key.clone(), *dep)?;
        self.graph.edge(&dep_key, &key)?;
        stack.push(*dep);
      }
    }
    Ok(())
  }

  /// Connect two targets already in the graph.
  pub fn edge(&mut self, session: &Session, from: TargetId, to: TargetId) -> Result<(), GraphError> {
    self.graph.edge(
      &session.target(from).identifier().to_string(),
      &session.target(to).identifier().to_string(),
    )
  }

  pub fn graph(&self) -> &DirectedGraph<String, TargetId> {
    &self.graph
  }

  pub fn targets(&self) -> impl Iterator<Item = TargetId> + '_ {
    self.graph.values().copied()
  }

  pub fn contains(&self, identifier: &str) -> bool {
    self.graph.contains(&identifier.to_string())
  }

  pub fn len(&self) -> usize {
    self.graph.len()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.is_empty()
  }

  /// Targets in dependency-first order.
  pub fn topo_sort(&self) -> Result<Vec<TargetId>, GraphError> {
    self.resolve(self.graph.topo_sort()?)
  }

  /// Translate every target in dependency-first order and collect the
  /// produced actions into an [`ActionGraph`].
  pub fn translate(&self, session: &mut Session) -> Result<ActionGraph, TranslateError> {
    let order = self.topo_sort()?;
    for id in &order {
      session.translate_target(*id)?;
    }

    let actions = ActionGraph::from_targets(session, order.iter().copied())?;
    info!(targets = order.len(), actions = actions.len(), "translated target graph");
    Ok(actions)
  }

  pub fn to_dot(&self, session: &Session) -> String {
    self
      .graph
      .to_dot("targets", |node| format!("{} ({})", node.key(), session.target(*node.value()).kind().kind()))
  }

  fn resolve(&self, keys: Vec<String>) -> Result<Vec<TargetId>, GraphError> {
    keys
      .into_iter()
      .map(|key| self.graph.get(&key).copied().ok_or(GraphError::MissingNode(key)))
      .collect()
  }
}

/// Actions keyed by `//scope:name!action`, with an edge from every
/// action-level dependency to its dependent.
#[derive(Debug, Clone, Default)]
pub struct ActionGraph {
  graph: DirectedGraph<String, ActionId>,
}

impl ActionGraph {
  /// Every action of the session.
  pub fn from_session(session: &Session) -> Result<Self, GraphError> {
    Self::from_actions(session, session.actions().map(|a| a.id()))
  }

  /// The actions of `targets` plus every action they transitively depend on.
  pub fn from_targets(session: &Session, targets: impl IntoIterator<Item = TargetId>) -> Result<Self, GraphError> {
    let actions: Vec<ActionId> = targets
      .into_iter()
      .flat_map(|t| session.target(t).actions().iter().copied())
      .collect();
    Self::from_actions(session, actions)
  }

  fn from_actions(session: &Session, roots: impl IntoIterator<Item = ActionId>) -> Result<Self, GraphError> {
    let mut graph = DirectedGraph::new();
    let mut stack: Vec<ActionId> = roots.into_iter().collect();
    let mut members = Vec::new();

    while let Some(id) = stack.pop() {
      let key = session.action(id).identifier().to_string();
      if graph.contains(&key) {
        continue;
      }
      graph.add(key, id)?;
      members.push(id);
      stack.extend(session.action(id).deps().iter().copied());
    }

    for id in members {
      let action = session.action(id);
      let key = action.identifier().to_string();
      for dep in action.deps() {
        graph.edge(&session.action(*dep).identifier().to_string(), &key)?;
      }
    }

    Ok(Self { graph })
  }

  pub fn graph(&self) -> &DirectedGraph<String, ActionId> {
    &self.graph
  }

  pub fn actions(&self) -> impl Iterator<Item = ActionId> + '_ {
    self.graph.values().copied()
  }

  pub fn contains(&self, identifier: &str) -> bool {
    self.graph.contains(&identifier.to_string())
  }

  pub fn len(&self) -> usize {
    self.graph.len()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.is_empty()
  }

  /// Actions in dependency-first order.
  pub fn topo_sort(&self) -> Result<Vec<ActionId>, GraphError> {
    self
      .graph
      .topo_sort()?
      .into_iter()
      .map(|key| self.graph.get(&key).copied().ok_or(GraphError::MissingNode(key)))
      .collect()
  }

  pub fn to_dot(&self, session: &Session) -> String {
    self.graph.to_dot("actions", |node| {
      let action = session.action(*node.value());
      format!("{} ({})", node.key(), action.kind().kind())
    })
  }
}
