//! Subcommand entry points.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::bundler::{CommandBundler, CommandInstaller};
use crate::config::BinderyConfig;
use crate::graph::UnitKind;
use crate::orchestrator::{Orchestrator, OrchestratorHandle, PushEvent};
use crate::store::BuildKey;
use crate::system::{BuildSystem, Collaborators};
use crate::vcs::GitSource;
use crate::version::ContentHash;

use super::serve;

/// Wire a [`BuildSystem`] to git and the configured commands.
fn open(config: Arc<BinderyConfig>) -> Result<BuildSystem> {
    let collaborators = Collaborators {
        source: Arc::new(GitSource::new()),
        bundler: Arc::new(CommandBundler::new(
            config.build.bundler.clone(),
            config.workspace.work_dir(),
        )),
        installer: Arc::new(CommandInstaller::new(config.build.installer.clone())),
    };
    BuildSystem::new(config, collaborators)
}

pub fn run_build(config: Arc<BinderyConfig>) -> Result<()> {
    let system = open(config)?;
    let report = system.start()?;
    report.summary().print();

    for (unit, error) in &report.failed {
        crate::log!("error"; "{}: {}", unit, error);
    }
    if !report.failed.is_empty() {
        bail!("{} unit(s) failed to build", report.failed.len());
    }
    Ok(())
}

pub fn run_serve(config: Arc<BinderyConfig>) -> Result<()> {
    let system = Arc::new(open(config)?);
    let report = system.start()?;
    report.summary().print();
    serve::serve(system)
}

/// Run `f` against a short-lived orchestrator, the way the server does.
fn with_orchestrator<T, F, Fut>(system: &Arc<BuildSystem>, f: F) -> Result<T>
where
    F: FnOnce(OrchestratorHandle) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async {
        let (handle, task) = Orchestrator::spawn(Arc::clone(system));
        let result = f(handle.clone()).await;
        handle.shutdown().await;
        let _ = task.await;
        result
    })
}

/// Feed one push through the orchestrator, exactly as the webhook would.
pub fn run_push(config: Arc<BinderyConfig>, repo: PathBuf, branch: String, commit: String) -> Result<()> {
    let system = Arc::new(open(config)?);
    system.load()?;

    let event = PushEvent { repo, branch, commit };
    let outcome = with_orchestrator(&system, |handle| async move { handle.push(event).await })?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

pub fn run_versions(config: Arc<BinderyConfig>, pretty: bool) -> Result<()> {
    let system = open(config)?;
    system.load()?;
    print_json(&system.snapshot().ev_map, pretty)
}

#[derive(Debug, Serialize)]
struct StatusLine {
    name: String,
    kind: UnitKind,
    path: String,
    ev: Option<ContentHash>,
    key: Option<BuildKey>,
    stored: bool,
}

pub fn run_status(config: Arc<BinderyConfig>, pretty: bool) -> Result<()> {
    let system = open(config)?;
    system.load()?;

    let lines: Vec<StatusLine> = system
        .list_buildables()
        .into_iter()
        .map(|unit| {
            let key = system.active_keys([unit.name.as_str()]).into_iter().next();
            StatusLine {
                ev: system.get_effective_version(&unit.name),
                stored: key.is_some_and(|k| system.store().has(&k)),
                key,
                name: unit.name,
                kind: unit.kind,
                path: unit.path,
            }
        })
        .collect();
    print_json(&lines, pretty)
}

pub fn run_gc(config: Arc<BinderyConfig>, units: Vec<String>) -> Result<()> {
    let system = Arc::new(open(config)?);
    system.load()?;

    let units = (!units.is_empty()).then_some(units);
    let report = with_orchestrator(&system, |handle| async move { handle.gc(units).await })?;
    println!("{}", serde_json::json!({ "freed": report.freed, "tempCleared": report.temp_cleared }));
    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}
