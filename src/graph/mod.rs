//! Workspace dependency graph.
//!
//! Units are nodes, `internal_deps` are directed edges (unit → dependency).
//!
//! # Invariants
//! - Edges form a DAG; a cycle is reported, never broken silently
//! - Orders are deterministic: units and their deps are visited in name order
//! - The cached topological order is dropped whenever the node set changes

mod unit;

pub use unit::{BuildSettings, RefPin, Unit, UnitKind};

use std::collections::{BTreeSet, VecDeque};
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

/// Graph lookup and ordering errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("unknown unit `{0}`")]
    UnknownUnit(String),

    #[error("dependency cycle: {}", render_cycle(.units))]
    Cycle { units: Vec<String> },

    #[error("topological order has not been computed")]
    OrderNotComputed,
}

fn render_cycle(units: &[String]) -> String {
    let mut path = units.join(" -> ");
    if let Some(first) = units.first() {
        path.push_str(" -> ");
        path.push_str(first);
    }
    path
}

/// In-memory unit graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: FxHashMap<String, Unit>,
    /// Last computed topological order (leaves first).
    order: Option<Vec<String>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a unit, replacing any unit of the same name.
    pub fn add_node(&mut self, unit: Unit) -> Option<Unit> {
        self.order = None;
        self.nodes.insert(unit.name.clone(), unit)
    }

    pub fn get(&self, name: &str) -> Result<&Unit, GraphError> {
        self.nodes
            .get(name)
            .ok_or_else(|| GraphError::UnknownUnit(name.to_string()))
    }

    /// Mutable access for in-place updates of commit and content hash.
    ///
    /// Callers must not change `internal_deps` through this; edges are only
    /// replaced by rebuilding the graph.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Unit, GraphError> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| GraphError::UnknownUnit(name.to_string()))
    }

    pub fn try_get(&self, name: &str) -> Option<&Unit> {
        self.nodes.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Whether `name` refers to a unit of this workspace.
    #[inline]
    pub fn is_internal(&self, name: &str) -> bool {
        self.has(name)
    }

    /// All units, sorted by name.
    pub fn all_nodes(&self) -> Vec<&Unit> {
        let mut units: Vec<_> = self.nodes.values().collect();
        units.sort_by(|a, b| a.name.cmp(&b.name));
        units
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find the unit whose repository lives at `path`.
    pub fn unit_for_path(&self, path: &Path) -> Option<&Unit> {
        self.nodes
            .values()
            .find(|u| u.path == path || u.relative_path == path)
    }

    /// Compute, cache and return the topological order (leaves first).
    pub fn compute_topological_order(&mut self) -> Result<&[String], GraphError> {
        let order = self.sort()?;
        let order = self.order.insert(order);
        Ok(order.as_slice())
    }

    /// The last computed topological order.
    pub fn topological_order(&self) -> Result<&[String], GraphError> {
        self.order.as_deref().ok_or(GraphError::OrderNotComputed)
    }

    /// Every unit whose dependency chain passes through `name`, direct or
    /// transitive. Does not include `name` itself.
    pub fn get_reverse_deps(&self, name: &str) -> Result<BTreeSet<String>, GraphError> {
        self.get(name)?;

        let mut dependents: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for unit in self.nodes.values() {
            for dep in self.edges(unit) {
                dependents.entry(dep).or_default().push(&unit.name);
            }
        }

        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            for &dependent in dependents.get(current).into_iter().flatten() {
                if dependent != name && seen.insert(dependent.to_string()) {
                    queue.push_back(dependent);
                }
            }
        }
        Ok(seen)
    }

    // -------------------------------------------------------------------------
    // Private
    // -------------------------------------------------------------------------

    /// Internal deps of `unit` that are members of this graph, in name order.
    fn edges<'a>(&'a self, unit: &'a Unit) -> impl Iterator<Item = &'a str> + 'a {
        unit.internal_deps
            .iter()
            .map(String::as_str)
            .filter(|dep| self.has(dep))
    }

    /// Iterative depth-first sort with an explicit path set for cycle
    /// detection.
    fn sort(&self) -> Result<Vec<String>, GraphError> {
        let mut roots: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        roots.sort_unstable();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut on_path: FxHashSet<&str> = FxHashSet::default();

        for root in roots {
            if visited.contains(root) {
                continue;
            }

            // (unit, its deps, index of next dep to visit)
            let mut stack: Vec<(&str, Vec<&str>, usize)> = vec![(root, self.deps_of(root), 0)];
            on_path.insert(root);

            while let Some((name, deps, next)) = stack.last_mut() {
                if let Some(&dep) = deps.get(*next) {
                    *next += 1;
                    if on_path.contains(dep) {
                        let start = stack.iter().position(|(n, _, _)| *n == dep).unwrap_or(0);
                        let units = stack[start..].iter().map(|(n, _, _)| n.to_string()).collect();
                        return Err(GraphError::Cycle { units });
                    }
                    if !visited.contains(dep) {
                        on_path.insert(dep);
                        stack.push((dep, self.deps_of(dep), 0));
                    }
                } else {
                    let name = *name;
                    stack.pop();
                    on_path.remove(name);
                    visited.insert(name);
                    order.push(name.to_string());
                }
            }
        }

        Ok(order)
    }

    fn deps_of(&self, name: &str) -> Vec<&str> {
        self.nodes
            .get(name)
            .map(|unit| self.edges(unit).collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================
