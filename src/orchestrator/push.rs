//! Handling of a single push.

use anyhow::Result;
use serde::Serialize;

use super::PushEvent;
use crate::graph::{Graph, Unit};
use crate::system::{BuildReport, BuildSystem};
use crate::vcs::normalize_branch;
use crate::version::ChangeSet;
use crate::workspace::read_manifest_at;

/// What a processed push did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PushOutcome {
    /// The push does not concern any tracked unit or branch.
    Ignored { reason: String },
    /// The pushed commit is already the recorded one.
    Unchanged { unit: String },
    /// The graph was rebuilt from the workspace.
    Rediscovered { changes: ChangeSet, report: BuildReport },
    /// Only the pushed unit and its dependents were recomputed.
    Incremental { unit: String, changes: ChangeSet, report: BuildReport },
}

impl std::fmt::Display for PushOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ignored { reason } => write!(f, "ignored: {reason}"),
            Self::Unchanged { unit } => write!(f, "{unit} unchanged"),
            Self::Rediscovered { changes, report } => {
                write!(f, "rediscovered: {changes}; {report}")
            }
            Self::Incremental {
                unit,
                changes,
                report,
            } => write!(f, "{unit}: {changes}; {report}"),
        }
    }
}

enum Route {
    /// The main branch the unit was discovered on.
    Main,
    /// A main branch preferred over the one the unit was discovered on.
    PreferredMain,
    TrackedRef,
}

/// Process one push to completion. Must not run concurrently with another
/// push or recompute against the same system.
pub fn handle_push(system: &BuildSystem, event: &PushEvent) -> Result<PushOutcome> {
    let state = system.snapshot();
    let workspace = &system.config().workspace;

    let repo = workspace.resolve_repo(&event.repo);
    let Some(unit) = state.graph.unit_for_path(&repo) else {
        return Ok(ignored(format!("{} is not a workspace unit", event.repo.display())));
    };

    let branch = normalize_branch(&event.branch);
    let tracked = unit
        .branch
        .as_deref()
        .and_then(|b| workspace.main_branch_rank(b));
    let route = match workspace.main_branch_rank(branch) {
        Some(rank) if tracked == Some(rank) => Route::Main,
        Some(rank) if tracked.is_none_or(|t| rank < t) => Route::PreferredMain,
        _ if is_tracked_ref(&state.graph, unit, branch, &event.commit) => Route::TrackedRef,
        _ => return Ok(ignored(format!("{} is not tracked for {}", branch, unit.name))),
    };

    crate::debug!("push"; "{}@{} -> {}", unit.name, branch, event.commit);

    match route {
        Route::TrackedRef => rediscover(system),
        Route::PreferredMain => {
            crate::debug!("push"; "{} now tracks {}, rediscovering", unit.name, branch);
            rediscover(system)
        }
        Route::Main => {
            let previous = state.refs.get(&unit.name);
            if previous.is_some_and(|c| *c == event.commit) {
                return Ok(PushOutcome::Unchanged {
                    unit: unit.name.clone(),
                });
            }
            // Dependents pinning this branch hold resolved commits that
            // the fast path does not refresh.
            if is_tracked_ref(&state.graph, unit, branch, &event.commit) {
                crate::debug!("push"; "{} is pinned by a dependent, rediscovering", unit.name);
                rediscover(system)
            } else if manifest_changed(system, unit, previous.map(String::as_str), &event.commit) {
                crate::debug!("push"; "manifest of {} changed, rediscovering", unit.name);
                rediscover(system)
            } else {
                let changes = system.advance_unit(&unit.name, &event.commit)?;
                let report = system.build_changed(&changes);
                Ok(PushOutcome::Incremental {
                    unit: unit.name.clone(),
                    changes,
                    report,
                })
            }
        }
    }
}

/// Forced full rediscovery.
pub fn recompute(system: &BuildSystem) -> Result<PushOutcome> {
    rediscover(system)
}

fn rediscover(system: &BuildSystem) -> Result<PushOutcome> {
    let changes = system.rediscover()?;
    let report = system.build_changed(&changes);
    Ok(PushOutcome::Rediscovered { changes, report })
}

fn ignored(reason: String) -> PushOutcome {
    PushOutcome::Ignored { reason }
}

/// Whether another unit pins `unit` to what this push moves.
fn is_tracked_ref(graph: &Graph, unit: &Unit, branch: &str, commit: &str) -> bool {
    graph.all_nodes().into_iter().any(|other| {
        other.name != unit.name
            && other
                .dep_refs()
                .get(&unit.name)
                .is_some_and(|pin| pin.matches_push(branch, commit))
    })
}

/// Compare the build-relevant manifest fields at both commits. Anything
/// unreadable counts as changed.
fn manifest_changed(system: &BuildSystem, unit: &Unit, previous: Option<&str>, next: &str) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    let file = &system.config().workspace.manifest;
    let read = |commit: &str| match read_manifest_at(system.source(), &unit.path, commit, file) {
        Ok(manifest) => manifest,
        Err(e) => {
            crate::debug!("push"; "cannot read {} of {} at {}: {:#}", file, unit.name, commit, e);
            None
        }
    };

    match (read(previous), read(next)) {
        (Some(old), Some(new)) => old != new,
        _ => true,
    }
}
