//! Building units into the store.

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use serde::Serialize;

use super::{BuildEvent, BuildStatus, BuildSystem, WorkspaceState};
use crate::bundler::BundleRequest;
use crate::deps::collect_transitive_external_deps;
use crate::graph::Unit;
use crate::logger::BatchReport;
use crate::store::{BuildKey, BuildMetadata, StoredBuild};
use crate::version::ContentHash;

/// Outcome of a batch of builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Units whose artifact was produced by this batch.
    pub built: Vec<String>,
    /// Units whose key was already in the store.
    pub cached: Vec<String>,
    /// Units that failed, with the error.
    pub failed: Vec<(String, String)>,
}

impl BuildReport {
    pub fn is_empty(&self) -> bool {
        self.built.is_empty() && self.cached.is_empty() && self.failed.is_empty()
    }

    /// Counters for the one-line terminal summary.
    pub fn summary(&self) -> BatchReport {
        BatchReport {
            built: self.built.len(),
            cached: self.cached.len(),
            failed: self.failed.len(),
        }
    }
}

impl std::fmt::Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} built, {} cached, {} failed",
            self.built.len(),
            self.cached.len(),
            self.failed.len()
        )
    }
}

enum Built {
    Fresh,
    Cached,
}

impl BuildSystem {
    /// Make sure every named unit has a build for its current key.
    ///
    /// Units are built in parallel on the build pool. Non-buildable and
    /// unknown names are skipped.
    pub fn build_batch(&self, names: &[String]) -> BuildReport {
        let state = self.snapshot();
        let targets: Vec<&Unit> = names
            .iter()
            .filter_map(|name| state.graph.try_get(name))
            .filter(|unit| unit.is_buildable())
            .collect();

        let results: Vec<(String, Result<Built>)> = self.pool.install(|| {
            targets
                .par_iter()
                .map(|unit| (unit.name.clone(), self.ensure_built(&state, unit).map(|(_, b)| b)))
                .collect()
        });

        let mut report = BuildReport::default();
        for (name, result) in results {
            match result {
                Ok(Built::Fresh) => report.built.push(name),
                Ok(Built::Cached) => report.cached.push(name),
                Err(e) => report.failed.push((name, format!("{e:#}"))),
            }
        }
        report
    }

    /// Stored build of `unit` in `state`, building it on a miss.
    pub(super) fn build_one(&self, state: &WorkspaceState, unit: &Unit) -> Result<StoredBuild> {
        self.ensure_built(state, unit).map(|(stored, _)| stored)
    }

    fn ensure_built(&self, state: &WorkspaceState, unit: &Unit) -> Result<(StoredBuild, Built)> {
        let ev = state
            .ev_map
            .get(&unit.name)
            .copied()
            .ok_or_else(|| anyhow!("`{}` has no effective version", unit.name))?;
        let key = BuildKey::compute(&unit.name, &ev, unit.flags());

        if let Some(stored) = self.store.get(&key)? {
            self.status.insert(unit.name.clone(), BuildStatus::Ready(key));
            return Ok((stored, Built::Cached));
        }

        self.status.insert(unit.name.clone(), BuildStatus::Building);
        self.emit(BuildEvent::BuildStarted {
            unit: unit.name.clone(),
            key,
        });

        match self.build_unit(state, unit, ev, key) {
            Ok(stored) => {
                self.status.insert(unit.name.clone(), BuildStatus::Ready(key));
                self.emit(BuildEvent::BuildComplete {
                    unit: unit.name.clone(),
                    key,
                });
                Ok((stored, Built::Fresh))
            }
            Err(e) => {
                let error = format!("{e:#}");
                crate::log!("build"; "{} failed: {}", unit.name, error);
                self.status
                    .insert(unit.name.clone(), BuildStatus::Failed(error.clone()));
                self.emit(BuildEvent::BuildError {
                    unit: unit.name.clone(),
                    error,
                });
                Err(e)
            }
        }
    }

    fn build_unit(
        &self,
        state: &WorkspaceState,
        unit: &Unit,
        ev: ContentHash,
        key: BuildKey,
    ) -> Result<StoredBuild> {
        let deps = collect_transitive_external_deps(&unit.name, &state.graph)?;
        let env = self.deps.ensure(&deps, &*self.installer)?;

        let flags = unit.flags();
        let request = BundleRequest {
            unit,
            deps_env: &env,
            flags,
        };
        let artifact = self
            .bundler
            .bundle(&request)
            .with_context(|| format!("failed to bundle `{}`", unit.name))?;

        let metadata = BuildMetadata::new(key, &unit.name, unit.kind, ev, flags, &artifact);
        let stored = self.store.put(&key, &artifact, &metadata)?;
        crate::log!("build"; "{} ({})", unit.name, &key.to_hex()[..12]);
        Ok(stored)
    }
}
