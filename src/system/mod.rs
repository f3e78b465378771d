//! The build system: one owned struct holding every piece of state.
//!
//! # State
//!
//! ```text
//! BuildSystem
//! ├── state: ArcSwap<WorkspaceState>   graph, EV map, refs, content hashes
//! ├── status: DashMap<unit, BuildStatus>
//! ├── store / deps / state_files       on-disk caches and documents
//! └── events: broadcast::Sender<BuildEvent>
//! ```
//!
//! Readers load the current [`WorkspaceState`] snapshot lock-free. Only the
//! startup sequence and the orchestrator actor publish a new one, always
//! after the state documents are persisted.

mod build;
mod event;

pub use build::BuildReport;
pub use event::BuildEvent;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use rustc_hash::FxHashSet;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::bundler::{Bundler, DepInstaller};
use crate::config::BinderyConfig;
use crate::deps::DepCache;
use crate::graph::{Graph, Unit, UnitKind};
use crate::store::{BuildKey, BuildStore, GcReport, StoredBuild};
use crate::vcs::SourceControl;
use crate::version::persist::{PersistedState, StateFiles};
use crate::version::{
    ChangeSet, ContentHash, ContentMap, EvMap, RefState, compute_effective_versions_with_cache,
    diff_ev_maps, recompute_from_node, ref_state,
};
use crate::workspace::discover;

/// Lifecycle events kept for slow subscribers.
const EVENT_CAPACITY: usize = 256;

/// Graph and versions as of the last successful update.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceState {
    pub graph: Graph,
    pub ev_map: EvMap,
    pub refs: RefState,
    pub contents: ContentMap,
}

impl WorkspaceState {
    fn persisted(&self) -> PersistedState {
        PersistedState {
            refs: self.refs.clone(),
            ev_map: self.ev_map.clone(),
            contents: self.contents.clone(),
        }
    }
}

/// Per-unit build state. A failure sticks until the next successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "lowercase")]
pub enum BuildStatus {
    Building,
    Ready(BuildKey),
    Failed(String),
}

/// Buildable unit as listed by the outbound API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSummary {
    pub name: String,
    pub kind: UnitKind,
    pub path: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl UnitSummary {
    fn from_unit(unit: &Unit) -> Self {
        Self {
            name: unit.name.clone(),
            kind: unit.kind,
            path: unit.relative_path.to_string_lossy().into_owned(),
            title: unit.settings.title.clone(),
            description: unit.settings.description.clone(),
        }
    }
}

/// Collaborators a [`BuildSystem`] is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SourceControl>,
    pub bundler: Arc<dyn Bundler>,
    pub installer: Arc<dyn DepInstaller>,
}

pub struct BuildSystem {
    config: Arc<BinderyConfig>,
    source: Arc<dyn SourceControl>,
    bundler: Arc<dyn Bundler>,
    installer: Arc<dyn DepInstaller>,
    store: BuildStore,
    deps: DepCache,
    state_files: StateFiles,
    state: ArcSwap<WorkspaceState>,
    status: DashMap<String, BuildStatus>,
    events: broadcast::Sender<BuildEvent>,
    pool: rayon::ThreadPool,
}

impl BuildSystem {
    pub fn new(config: Arc<BinderyConfig>, collaborators: Collaborators) -> Result<Self> {
        let workspace = &config.workspace;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.build.jobs)
            .thread_name(|i| format!("bindery-build-{i}"))
            .build()
            .context("failed to create build pool")?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            store: BuildStore::new(workspace.builds_dir()),
            deps: DepCache::new(workspace.deps_dir()),
            state_files: StateFiles::new(&workspace.state_dir),
            source: collaborators.source,
            bundler: collaborators.bundler,
            installer: collaborators.installer,
            state: ArcSwap::from_pointee(WorkspaceState::default()),
            status: DashMap::new(),
            events,
            pool,
            config,
        })
    }

    pub fn config(&self) -> &BinderyConfig {
        &self.config
    }

    pub fn store(&self) -> &BuildStore {
        &self.store
    }

    pub(crate) fn source(&self) -> &dyn SourceControl {
        &*self.source
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> Arc<WorkspaceState> {
        self.state.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: BuildEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Restore persisted state, discover the workspace, compute versions and
    /// publish them. Nothing is built.
    pub fn load(&self) -> Result<ChangeSet> {
        let persisted = self.state_files.load()?;

        let mut graph = discover(&self.config.workspace, &*self.source)
            .context("workspace discovery failed")?;
        let refs = ref_state(&graph);
        let versions = compute_effective_versions_with_cache(
            &mut graph,
            &refs,
            &persisted.refs,
            &persisted.contents,
            &*self.source,
        )?;
        crate::log!(
            "start";
            "{} units, {} content hashes reused",
            graph.len(),
            versions.reused
        );

        let changes = diff_ev_maps(&persisted.ev_map, &versions.ev_map);
        self.install(
            WorkspaceState {
                graph,
                ev_map: versions.ev_map,
                refs,
                contents: versions.contents,
            },
            &changes,
        )?;
        Ok(changes)
    }

    /// [`load`](Self::load), then build every buildable unit whose key is
    /// missing from the store.
    pub fn start(&self) -> Result<BuildReport> {
        self.load()?;
        let buildables = buildable_names(&self.snapshot().graph);
        Ok(self.build_batch(&buildables))
    }

    /// Rediscover the workspace and replace the whole state.
    ///
    /// On any failure (cycle, bad manifest, unreadable repository) the
    /// previous state stays published.
    pub(crate) fn rediscover(&self) -> Result<ChangeSet> {
        let prev = self.snapshot();

        let mut graph = discover(&self.config.workspace, &*self.source)?;
        let refs = ref_state(&graph);
        let versions = compute_effective_versions_with_cache(
            &mut graph,
            &refs,
            &prev.refs,
            &prev.contents,
            &*self.source,
        )?;
        let changes = diff_ev_maps(&prev.ev_map, &versions.ev_map);
        let units = graph.len();

        self.install(
            WorkspaceState {
                graph,
                ev_map: versions.ev_map,
                refs,
                contents: versions.contents,
            },
            &changes,
        )?;
        self.emit(BuildEvent::GraphUpdated { units });
        Ok(changes)
    }

    /// Move one unit to `commit`, recomputing only what depends on it.
    pub(crate) fn advance_unit(&self, name: &str, commit: &str) -> Result<ChangeSet> {
        let prev = self.snapshot();

        let mut graph = prev.graph.clone();
        let ev_map = recompute_from_node(&mut graph, name, &prev.ev_map, commit, &*self.source)?;
        let changes = diff_ev_maps(&prev.ev_map, &ev_map);

        let mut refs = prev.refs.clone();
        refs.insert(name.to_string(), commit.to_string());
        let mut contents = prev.contents.clone();
        contents.insert(name.to_string(), graph.get(name)?.content_hash);

        self.install(
            WorkspaceState {
                graph,
                ev_map,
                refs,
                contents,
            },
            &changes,
        )?;
        Ok(changes)
    }

    /// Persist, then publish.
    fn install(&self, next: WorkspaceState, changes: &ChangeSet) -> Result<()> {
        self.state_files
            .save(&next.persisted())
            .context("failed to persist state")?;
        let next = Arc::new(next);
        self.state.store(Arc::clone(&next));
        self.status.retain(|name, _| next.graph.has(name));

        if !changes.is_empty() {
            crate::log!("change"; "{}", changes);
            self.emit(BuildEvent::ChangeDetected {
                changes: changes.clone(),
            });
        }
        Ok(())
    }

    /// Build every changed or added buildable unit that is missing a build.
    pub fn build_changed(&self, changes: &ChangeSet) -> BuildReport {
        let names: Vec<String> = changes.affected().into_iter().map(String::from).collect();
        if names.is_empty() {
            return BuildReport::default();
        }
        self.build_batch(&names)
    }

    /// Resolve a unit by name, absolute path, or workspace-relative path.
    fn lookup<'a>(&self, state: &'a WorkspaceState, unit: &str) -> Option<&'a Unit> {
        state.graph.try_get(unit).or_else(|| {
            let path = self.config.workspace.resolve_repo(Path::new(unit));
            state.graph.unit_for_path(&path)
        })
    }

    /// Stored build for `unit`, building it synchronously on a miss.
    pub fn get_build(&self, unit: &str) -> Result<StoredBuild> {
        let state = self.snapshot();
        let found = self
            .lookup(&state, unit)
            .ok_or_else(|| anyhow!("unknown unit `{unit}`"))?;
        if !found.is_buildable() {
            bail!("`{}` is a {} and has no build", found.name, found.kind);
        }
        self.build_one(&state, found)
    }

    pub fn get_effective_version(&self, unit: &str) -> Option<ContentHash> {
        let state = self.snapshot();
        let found = self.lookup(&state, unit)?;
        state.ev_map.get(&found.name).copied()
    }

    pub fn has_unit(&self, unit: &str) -> bool {
        let state = self.snapshot();
        self.lookup(&state, unit).is_some()
    }

    pub fn list_buildables(&self) -> Vec<UnitSummary> {
        self.snapshot()
            .graph
            .all_nodes()
            .into_iter()
            .filter(|u| u.is_buildable())
            .map(UnitSummary::from_unit)
            .collect()
    }

    pub fn build_status(&self, unit: &str) -> Option<BuildStatus> {
        self.status.get(unit).map(|s| s.value().clone())
    }

    /// Current build key of every named buildable unit.
    pub fn active_keys<'a>(&self, units: impl IntoIterator<Item = &'a str>) -> FxHashSet<BuildKey> {
        let state = self.snapshot();
        units
            .into_iter()
            .filter_map(|name| {
                let unit = self.lookup(&state, name)?;
                let ev = state.ev_map.get(&unit.name)?;
                Some(BuildKey::compute(&unit.name, ev, unit.flags()))
            })
            .collect()
    }

    /// Drop every stored build except the current builds of `active`.
    pub fn gc<S: AsRef<str>>(&self, active: &[S]) -> Result<GcReport> {
        let keys = self.active_keys(active.iter().map(AsRef::as_ref));
        let report = self.store.gc(&keys)?;
        crate::log!(
            "gc";
            "kept {}, freed {}, cleared {} temp dirs",
            keys.len(),
            report.freed,
            report.temp_cleared
        );
        Ok(report)
    }
}

fn buildable_names(graph: &Graph) -> Vec<String> {
    graph
        .all_nodes()
        .into_iter()
        .filter(|u| u.is_buildable())
        .map(|u| u.name.clone())
        .collect()
}
