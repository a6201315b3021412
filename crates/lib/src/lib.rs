//! kiln-lib: build graph, action hashing and execution engine for kiln
//!
//! Build intent is declared as targets, translated into a graph of actions,
//! and the action graph is then either executed natively or exported:
//! - `graph`: generic directed graph with topological ordering
//! - `session`: arena of scopes, targets and actions, plus their graphs
//! - `target` / `action`: the two-phase entity model and its built-in kinds
//! - `hash` / `cache`: content-addressable action keys and incremental skips
//! - `execute`: the concurrent polling scheduler
//! - `export`: ninja-compatible build file writer
//! - `manifest`: the declarative `kiln.toml` front end

pub mod action;
pub mod cache;
pub mod consts;
pub mod execute;
pub mod export;
pub mod graph;
pub mod hash;
pub mod manifest;
pub mod session;
pub mod stash;
pub mod target;
pub mod util;
