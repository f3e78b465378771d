//! Scan the workspace roots into a [`Graph`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::manifest::{Manifest, read_manifest_at};
use crate::config::WorkspaceConfig;
use crate::graph::{Graph, Unit, UnitKind};
use crate::vcs::SourceControl;

/// A directory under a unit root that may hold a unit repository.
#[derive(Debug, Clone)]
struct Candidate {
    path: PathBuf,
    kind: UnitKind,
}

/// Discover every unit of the workspace at the tip of its main branch.
///
/// Directories that are not readable repositories are skipped. A readable
/// repository without a valid manifest, or two units with the same name,
/// fail the whole discovery.
pub fn discover(config: &WorkspaceConfig, source: &dyn SourceControl) -> Result<Graph> {
    let candidates = scan_roots(config)?;

    let read = candidates
        .par_iter()
        .map(|candidate| read_candidate(config, source, candidate))
        .collect::<Result<Vec<_>>>()?;

    let mut units: Vec<Unit> = Vec::with_capacity(read.len());
    let mut seen: FxHashMap<String, PathBuf> = FxHashMap::default();
    for unit in read.into_iter().flatten() {
        if let Some(other) = seen.insert(unit.name.clone(), unit.path.clone()) {
            bail!(
                "duplicate unit name `{}` in {} and {}",
                unit.name,
                other.display(),
                unit.path.display()
            );
        }
        units.push(unit);
    }

    let names: Vec<String> = units.iter().map(|u| u.name.clone()).collect();
    let is_member = |name: &str| names.iter().any(|n| n == name);
    let paths: FxHashMap<String, PathBuf> = units
        .iter()
        .map(|u| (u.name.clone(), u.path.clone()))
        .collect();

    let mut graph = Graph::new();
    for mut unit in units {
        unit.internal_deps = unit
            .declared_deps
            .keys()
            .filter(|dep| **dep != unit.name && is_member(dep))
            .cloned()
            .collect();
        resolve_pins(&mut unit, &paths, source)?;
        graph.add_node(unit);
    }

    crate::debug!("discover"; "{} units in {} candidates", graph.len(), candidates.len());
    Ok(graph)
}

/// Sorted, non-hidden subdirectories of every configured root.
fn scan_roots(config: &WorkspaceConfig) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for root in &config.roots {
        if !root.path.is_dir() {
            crate::debug!("discover"; "skipping missing root {}", root.path.display());
            continue;
        }
        let entries = fs::read_dir(&root.path)
            .with_context(|| format!("failed to list {}", root.path.display()))?;

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .map(|entry| entry.path())
            .collect();
        dirs.sort();

        candidates.extend(dirs.into_iter().map(|path| Candidate {
            path,
            kind: root.kind,
        }));
    }
    Ok(candidates)
}

fn read_candidate(
    config: &WorkspaceConfig,
    source: &dyn SourceControl,
    candidate: &Candidate,
) -> Result<Option<Unit>> {
    let path = &candidate.path;
    let Some((branch, commit)) = tracked_commit(config, source, path) else {
        return Ok(None);
    };

    let manifest = read_manifest_at(source, path, &commit, &config.manifest)?
        .ok_or_else(|| anyhow!("{} has no {}", path.display(), config.manifest))?;

    let mut unit = into_unit(manifest, candidate, commit, &config.root);
    unit.branch = branch;
    Ok(Some(unit))
}

/// Tip of the first configured main branch that exists, else HEAD.
fn tracked_commit(
    config: &WorkspaceConfig,
    source: &dyn SourceControl,
    path: &Path,
) -> Option<(Option<String>, String)> {
    for branch in &config.main_branches {
        if let Ok(commit) = source.resolve(path, &format!("refs/heads/{branch}")) {
            return Some((Some(branch.clone()), commit));
        }
    }
    match source.head_commit(path) {
        Ok(commit) => Some((None, commit)),
        Err(err) => {
            crate::debug!("discover"; "skipping {}: {:#}", path.display(), err);
            None
        }
    }
}

fn into_unit(manifest: Manifest, candidate: &Candidate, commit: String, root: &Path) -> Unit {
    let mut unit = Unit::new(manifest.name, candidate.kind);
    unit.relative_path = candidate
        .path
        .strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| candidate.path.clone());
    unit.path = candidate.path.clone();
    unit.declared_deps = manifest.dependencies;
    unit.settings = manifest.bindery;
    unit.commit = commit;
    unit
}

/// Resolve `dep_refs` pins on internal dependencies to commits.
fn resolve_pins(
    unit: &mut Unit,
    paths: &FxHashMap<String, PathBuf>,
    source: &dyn SourceControl,
) -> Result<()> {
    let mut pinned = BTreeMap::new();
    for (dep, pin) in unit.dep_refs() {
        let Some(dep_path) = paths.get(dep).filter(|_| unit.internal_deps.contains(dep)) else {
            crate::debug!("discover"; "`{}` pins `{}`, which is not an internal dependency", unit.name, dep);
            continue;
        };
        let commit = source
            .resolve(dep_path, &pin.rev_spec())
            .with_context(|| format!("`{}` pins `{}` at {:?}", unit.name, dep, pin))?;
        pinned.insert(dep.clone(), commit);
    }
    unit.pinned = pinned;
    Ok(())
}
