//! External (registry) dependencies of buildable units.
//!
//! A unit's build environment needs every external package declared by the
//! unit itself and by anything it reaches through `internal_deps`. That set
//! is collected here, conflict-resolved, hashed, and installed once per hash
//! by [`DepCache`].

mod cache;
mod resolve;

pub use cache::DepCache;
pub use resolve::{compare_versions, is_pseudo_reference, is_wildcard, prefers};

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::graph::{Graph, GraphError};
use crate::version::{ContentHash, Hasher};

/// Deduplicated package name → version request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalDepSet(BTreeMap<String, String>);

impl ExternalDepSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request, keeping whichever version [`prefers`] picks.
    /// Returns whether the set changed.
    pub fn merge(&mut self, name: &str, version: &str) -> bool {
        match self.0.get_mut(name) {
            Some(current) if prefers(version, current) => {
                *current = version.to_string();
                true
            }
            Some(_) => false,
            None => {
                self.0.insert(name.to_string(), version.to_string());
                true
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cache key: hash of the sorted (name, version) pairs.
    pub fn hash(&self) -> ContentHash {
        let mut hasher = Hasher::new("deps");
        for (name, version) in &self.0 {
            hasher.str(name).str(version);
        }
        hasher.finish()
    }
}

/// Every external dependency reachable from `unit`, itself included.
///
/// Units are visited breadth-first with dependencies in name order, so the
/// "first seen" request on a tie is deterministic.
pub fn collect_transitive_external_deps(
    unit: &str,
    graph: &Graph,
) -> Result<ExternalDepSet, GraphError> {
    let mut set = ExternalDepSet::new();
    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::from([graph.get(unit)?]);
    visited.insert(unit.to_string());

    while let Some(current) = queue.pop_front() {
        for (name, version) in &current.declared_deps {
            if graph.is_internal(name) || is_pseudo_reference(version) {
                continue;
            }
            set.merge(name, version);
        }
        for dep in &current.internal_deps {
            if let Some(next) = graph.try_get(dep)
                && visited.insert(dep.clone())
            {
                queue.push_back(next);
            }
        }
    }

    Ok(set)
}
