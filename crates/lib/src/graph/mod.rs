//! Generic directed graph.
//!
//! A keyed node container with symmetric edge bookkeeping, root/leaf queries,
//! Kahn's-algorithm topological ordering, and cycle detection. It knows
//! nothing about targets or actions; [`crate::session`] specializes it.
//!
//! Every node records the keys of the nodes it depends on (`inputs`) and of
//! the nodes that depend on it (`outputs`). The two sets are kept in sync:
//! `a.outputs` contains `b` exactly when `b.inputs` contains `a`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::{Display, Write};

use thiserror::Error;

/// Errors raised by graph operations.
///
/// All of these are consistency errors and are never silently degraded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
  /// A different value already occupies the key.
  #[error("graph does not support reassignment (attempted to reassign {0})")]
  NotReassignable(String),

  /// The referenced node is not part of the graph.
  #[error("no such node: {0}")]
  MissingNode(String),

  /// The edge to remove does not exist.
  #[error("no connection {from} -> {to}")]
  NoSuchEdge { from: String, to: String },

  /// Topological ordering found nodes whose inputs never drained.
  #[error("graph has at least one cycle (involving {})", remaining.join(", "))]
  Cycle { remaining: Vec<String> },
}

/// A graph vertex.
#[derive(Debug, Clone)]
pub struct Node<K, V> {
  key: K,
  value: V,
  inputs: BTreeSet<K>,
  outputs: BTreeSet<K>,
}

impl<K, V> Node<K, V> {
  pub fn key(&self) -> &K {
    &self.key
  }

  pub fn value(&self) -> &V {
    &self.value
  }

  /// Keys of the nodes this node depends on.
  pub fn inputs(&self) -> &BTreeSet<K> {
    &self.inputs
  }

  /// Keys of the nodes that depend on this node.
  pub fn outputs(&self) -> &BTreeSet<K> {
    &self.outputs
  }
}

/// A directed graph of keyed nodes.
///
/// Nodes are stored in key order so that every traversal is deterministic.
#[derive(Debug, Clone)]
pub struct DirectedGraph<K, V> {
  nodes: BTreeMap<K, Node<K, V>>,
}

impl<K, V> Default for DirectedGraph<K, V> {
  fn default() -> Self {
    Self { nodes: BTreeMap::new() }
  }
}

impl<K, V> DirectedGraph<K, V>
where
  K: Ord + Clone + Display,
{
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a node.
  ///
  /// Re-inserting an equal value under an existing key is a no-op. A
  /// different value under an existing key is an error.
  pub fn add(&mut self, key: K, value: V) -> Result<(), GraphError>
  where
    V: PartialEq,
  {
    if let Some(existing) = self.nodes.get(&key) {
      if existing.value == value {
        return Ok(());
      }
      return Err(GraphError::NotReassignable(key.to_string()));
    }

    self.nodes.insert(
      key.clone(),
      Node {
        key,
        value,
        inputs: BTreeSet::new(),
        outputs: BTreeSet::new(),
      },
    );
    Ok(())
  }

  /// Remove a node, disconnecting all of its edges first.
  pub fn remove(&mut self, key: &K) -> Result<V, GraphError> {
    self.disconnect_all(key)?;
    self
      .nodes
      .remove(key)
      .map(|node| node.value)
      .ok_or_else(|| GraphError::MissingNode(key.to_string()))
  }

  /// Record that `to` depends on `from`. Adding an existing edge is a no-op.
  pub fn edge(&mut self, from: &K, to: &K) -> Result<(), GraphError> {
    self.require(from)?;
    self.require(to)?;

    if let Some(node) = self.nodes.get_mut(from) {
      node.outputs.insert(to.clone());
    }
    if let Some(node) = self.nodes.get_mut(to) {
      node.inputs.insert(from.clone());
    }
    Ok(())
  }

  /// Remove the edge `from -> to`.
  pub fn disconnect(&mut self, from: &K, to: &K) -> Result<(), GraphError> {
    self.require(from)?;
    self.require(to)?;

    let removed_out = self.nodes.get_mut(from).is_some_and(|n| n.outputs.remove(to));
    let removed_in = self.nodes.get_mut(to).is_some_and(|n| n.inputs.remove(from));

    if !removed_out && !removed_in {
      return Err(GraphError::NoSuchEdge {
        from: from.to_string(),
        to: to.to_string(),
      });
    }
    Ok(())
  }

  /// Remove `key` from the adjacency sets of all of its neighbours.
  pub fn disconnect_all(&mut self, key: &K) -> Result<(), GraphError> {
    let (inputs, outputs) = match self.nodes.get_mut(key) {
      Some(node) => (std::mem::take(&mut node.inputs), std::mem::take(&mut node.outputs)),
      None => return Err(GraphError::MissingNode(key.to_string())),
    };

    for source in &inputs {
      if let Some(node) = self.nodes.get_mut(source) {
        node.outputs.remove(key);
      }
    }
    for dest in &outputs {
      if let Some(node) = self.nodes.get_mut(dest) {
        node.inputs.remove(key);
      }
    }
    Ok(())
  }

  pub fn contains(&self, key: &K) -> bool {
    self.nodes.contains_key(key)
  }

  pub fn has_edge(&self, from: &K, to: &K) -> bool {
    self.nodes.get(to).is_some_and(|n| n.inputs.contains(from))
  }

  pub fn get(&self, key: &K) -> Option<&V> {
    self.nodes.get(key).map(|n| &n.value)
  }

  pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
    self.nodes.get_mut(key).map(|n| &mut n.value)
  }

  pub fn node(&self, key: &K) -> Option<&Node<K, V>> {
    self.nodes.get(key)
  }

  /// Keys of the nodes `key` depends on. Empty for unknown keys.
  pub fn inputs<'a>(&'a self, key: &K) -> impl Iterator<Item = &'a K> + 'a {
    self.nodes.get(key).into_iter().flat_map(|n| n.inputs.iter())
  }

  /// Keys of the nodes that depend on `key`. Empty for unknown keys.
  pub fn outputs<'a>(&'a self, key: &K) -> impl Iterator<Item = &'a K> + 'a {
    self.nodes.get(key).into_iter().flat_map(|n| n.outputs.iter())
  }

  pub fn keys(&self) -> impl Iterator<Item = &K> {
    self.nodes.keys()
  }

  pub fn values(&self) -> impl Iterator<Item = &V> {
    self.nodes.values().map(|n| &n.value)
  }

  pub fn nodes(&self) -> impl Iterator<Item = &Node<K, V>> {
    self.nodes.values()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Nodes without inputs. Computed on demand.
  pub fn roots(&self) -> impl Iterator<Item = &K> {
    self.nodes.values().filter(|n| n.inputs.is_empty()).map(|n| &n.key)
  }

  /// Nodes without outputs. Computed on demand.
  pub fn leafs(&self) -> impl Iterator<Item = &K> {
    self.nodes.values().filter(|n| n.outputs.is_empty()).map(|n| &n.key)
  }

  /// Order all nodes so that every node precedes the nodes depending on it.
  ///
  /// Uses Kahn's algorithm. Each edge is consumed at most once. If any node
  /// still has unconsumed inputs once the queue drains, the graph has a cycle
  /// and no order is returned.
  pub fn topo_sort(&self) -> Result<Vec<K>, GraphError> {
    let mut remaining: BTreeMap<&K, usize> = self.nodes.iter().map(|(k, n)| (k, n.inputs.len())).collect();
    let mut queue: VecDeque<&K> = self.roots().collect();
    let mut consumed: BTreeSet<(&K, &K)> = BTreeSet::new();
    let mut order = Vec::with_capacity(self.nodes.len());

    while let Some(key) = queue.pop_front() {
      order.push(key.clone());

      let Some(node) = self.nodes.get(key) else {
        continue;
      };
      for output in &node.outputs {
        if !consumed.insert((key, output)) {
          continue;
        }
        if let Some(count) = remaining.get_mut(output) {
          *count = count.saturating_sub(1);
          if *count == 0 {
            queue.push_back(output);
          }
        }
      }
    }

    let stuck: Vec<String> = remaining
      .iter()
      .filter(|(_, count)| **count > 0)
      .map(|(key, _)| key.to_string())
      .collect();

    if !stuck.is_empty() {
      return Err(GraphError::Cycle { remaining: stuck });
    }
    Ok(order)
  }

  /// Render the graph in Graphviz DOT format.
  pub fn to_dot(&self, title: &str, label: impl Fn(&Node<K, V>) -> String) -> String {
    let ids: BTreeMap<&K, usize> = self.nodes.keys().enumerate().map(|(i, k)| (k, i)).collect();
    let mut out = String::new();

    let _ = writeln!(out, "digraph \"{}\" {{", escape_dot(title));
    for node in self.nodes.values() {
      let id = ids[&node.key];
      let _ = writeln!(out, "\tn{} [label=\"{}\"];", id, escape_dot(&label(node)));
      for input in &node.inputs {
        if let Some(from) = ids.get(input) {
          let _ = writeln!(out, "\t\tn{} -> n{};", from, id);
        }
      }
    }
    out.push_str("}\n");
    out
  }

  fn require(&self, key: &K) -> Result<(), GraphError> {
    if self.nodes.contains_key(key) {
      Ok(())
    } else {
      Err(GraphError::MissingNode(key.to_string()))
    }
  }
}

fn escape_dot(s: &str) -> String {
  s.replace('\\', "\\\\").replace('"', "\\\"")
}
