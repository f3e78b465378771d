//! Effective-version engine.
//!
//! An effective version (EV) folds a unit's own content hash together with
//! its resolved dependency pins and the EVs of its direct internal
//! dependencies. Because dependency EVs already fold their own subtrees, a
//! unit's EV is a pure function of everything reachable from it: editing a
//! leaf changes the EV of the leaf and every unit above it, and nothing else.
//!
//! Three entry points:
//! - [`compute_effective_versions`] for a graph whose content hashes are set
//! - [`compute_effective_versions_with_cache`] for cold start and rediscovery,
//!   reusing content hashes of units whose commit did not move
//! - [`recompute_from_node`] for the fast path after a single push

mod diff;
mod hash;
pub mod persist;

pub use diff::{ChangeSet, diff_ev_maps};
pub use hash::{ContentHash, Hasher};

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use rayon::prelude::*;
use thiserror::Error;

use crate::graph::{Graph, GraphError, Unit};
use crate::vcs::SourceControl;

/// Unit name → effective version.
pub type EvMap = BTreeMap<String, ContentHash>;

/// Unit name → content hash of its source tree.
pub type ContentMap = BTreeMap<String, ContentHash>;

/// Unit name → last-known commit.
pub type RefState = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("content hash of `{0}` is not resolved")]
    MissingContent(String),

    #[error("`{unit}` depends on `{dep}`, which has no effective version")]
    MissingDependency { unit: String, dep: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Result of a cached computation.
#[derive(Debug, Clone, Default)]
pub struct Versions {
    pub ev_map: EvMap,
    pub contents: ContentMap,
    /// Units whose content hash was reused rather than recomputed.
    pub reused: usize,
}

/// Hash a unit's EV from its parts. `dep_evs` may be in any order.
pub fn effective_version(
    content: &ContentHash,
    pins: &BTreeMap<String, String>,
    mut dep_evs: Vec<ContentHash>,
) -> ContentHash {
    dep_evs.sort_unstable();

    let mut hasher = Hasher::new("ev");
    hasher.hash(content);
    for (name, commit) in pins {
        hasher.str("pin").str(name).str(commit);
    }
    for ev in &dep_evs {
        hasher.hash(ev);
    }
    hasher.finish()
}

/// EV of `unit`, looking its dependencies up in `evs`.
fn unit_ev(graph: &Graph, unit: &Unit, evs: &EvMap) -> Result<ContentHash, VersionError> {
    if unit.content_hash.is_empty() {
        return Err(VersionError::MissingContent(unit.name.clone()));
    }

    let dep_evs = unit
        .internal_deps
        .iter()
        .filter(|dep| graph.has(dep))
        .map(|dep| {
            evs.get(dep)
                .copied()
                .ok_or_else(|| VersionError::MissingDependency {
                    unit: unit.name.clone(),
                    dep: dep.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(effective_version(&unit.content_hash, &unit.pinned, dep_evs))
}

/// Compute the EV of every unit, leaves first.
///
/// Fails with [`VersionError::MissingContent`] if any content hash is unset
/// and with a cycle error if the graph is not a DAG.
pub fn compute_effective_versions(graph: &mut Graph) -> Result<EvMap, VersionError> {
    let order = graph.compute_topological_order()?.to_vec();
    let mut evs = EvMap::new();

    for name in &order {
        let unit = graph.get(name)?;
        let ev = unit_ev(graph, unit, &evs)?;
        evs.insert(name.clone(), ev);
    }

    Ok(evs)
}

/// Resolve content hashes (reusing `prev_contents` where the commit in
/// `current_refs` equals the one in `prev_refs`), then compute every EV.
///
/// Units missing from `current_refs` fall back to their own `commit`.
pub fn compute_effective_versions_with_cache(
    graph: &mut Graph,
    current_refs: &RefState,
    prev_refs: &RefState,
    prev_contents: &ContentMap,
    source: &dyn SourceControl,
) -> Result<Versions> {
    let mut reused = 0;
    let mut pending: Vec<(String, PathBuf, String)> = Vec::new();

    for unit in graph.all_nodes() {
        let commit = current_refs
            .get(&unit.name)
            .cloned()
            .unwrap_or_else(|| unit.commit.clone());
        let cached = match prev_refs.get(&unit.name) {
            Some(prev) if *prev == commit => prev_contents.get(&unit.name).copied(),
            _ => None,
        };
        match cached {
            Some(_) => reused += 1,
            None => pending.push((unit.name.clone(), unit.path.clone(), commit)),
        }
    }

    let hashed = pending
        .par_iter()
        .map(|(name, path, commit)| {
            source
                .content_hash(path, commit)
                .with_context(|| format!("failed to hash `{name}` at {commit}"))
                .map(|hash| (name.as_str(), hash))
        })
        .collect::<Result<Vec<_>>>()?;
    let hashed: BTreeMap<&str, ContentHash> = hashed.into_iter().collect();

    let names: Vec<String> = graph.all_nodes().iter().map(|u| u.name.clone()).collect();
    let mut contents = ContentMap::new();
    for name in names {
        let unit = graph.get_mut(&name)?;
        if let Some(commit) = current_refs.get(&name) {
            unit.commit = commit.clone();
        }
        unit.content_hash = match hashed.get(name.as_str()) {
            Some(hash) => *hash,
            None => prev_contents
                .get(&name)
                .copied()
                .unwrap_or_else(ContentHash::empty),
        };
        contents.insert(name, unit.content_hash);
    }

    crate::debug!("version"; "{} content hashes reused, {} computed", reused, hashed.len());

    let ev_map = compute_effective_versions(graph)?;
    Ok(Versions {
        ev_map,
        contents,
        reused,
    })
}

/// Move `name` to `new_commit` and recompute the EVs of it and every unit
/// that depends on it. All other entries are carried over from `prev`.
pub fn recompute_from_node(
    graph: &mut Graph,
    name: &str,
    prev: &EvMap,
    new_commit: &str,
    source: &dyn SourceControl,
) -> Result<EvMap> {
    let path = graph.get(name)?.path.clone();
    let content = source
        .content_hash(&path, new_commit)
        .with_context(|| format!("failed to hash `{name}` at {new_commit}"))?;

    let unit = graph.get_mut(name)?;
    unit.commit = new_commit.to_string();
    unit.content_hash = content;

    let mut affected: BTreeSet<String> = graph.get_reverse_deps(name)?;
    affected.insert(name.to_string());

    let order = graph.compute_topological_order()?.to_vec();
    let mut evs = prev.clone();
    for unit_name in order.iter().filter(|n| affected.contains(*n)) {
        let unit = graph.get(unit_name)?;
        let ev = unit_ev(graph, unit, &evs)?;
        evs.insert(unit_name.clone(), ev);
    }

    crate::debug!("version"; "recomputed {} from `{}`", affected.len(), name);
    Ok(evs)
}

/// Commit of every unit in the graph.
pub fn ref_state(graph: &Graph) -> RefState {
    graph
        .all_nodes()
        .into_iter()
        .map(|u| (u.name.clone(), u.commit.clone()))
        .collect()
}

/// Content hash of every unit in the graph.
pub fn content_map(graph: &Graph) -> ContentMap {
    graph
        .all_nodes()
        .into_iter()
        .map(|u| (u.name.clone(), u.content_hash))
        .collect()
}
