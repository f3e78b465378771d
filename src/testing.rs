//! Shared fixtures: a temp workspace backed by an in-memory repository
//! source, with a fake bundler and installer.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde_json::json;
use tempfile::TempDir;

use crate::bundler::{BundleRequest, Bundler, DepInstaller};
use crate::config::BinderyConfig;
use crate::deps::ExternalDepSet;
use crate::store::BuildArtifact;
use crate::system::{BuildSystem, Collaborators};
use crate::vcs::memory::MemorySource;

/// Bundles `name@commit` into `bundle.js` and records every call.
#[derive(Debug, Default)]
pub struct FakeBundler {
    calls: Mutex<Vec<String>>,
    failing: Mutex<FxHashSet<String>>,
    watched: Mutex<Option<PathBuf>>,
    /// `(unit, contents of the watched file)` at each call.
    observed: Mutex<Vec<(String, String)>>,
}

impl FakeBundler {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn fail(&self, unit: &str) {
        self.failing.lock().insert(unit.to_string());
    }

    pub fn recover(&self, unit: &str) {
        self.failing.lock().remove(unit);
    }

    /// Read `file` at the start of every bundle call.
    pub fn watch(&self, file: impl Into<PathBuf>) {
        *self.watched.lock() = Some(file.into());
    }

    pub fn observed(&self) -> Vec<(String, String)> {
        self.observed.lock().clone()
    }
}

impl Bundler for FakeBundler {
    fn bundle(&self, request: &BundleRequest<'_>) -> Result<BuildArtifact> {
        let unit = request.unit;
        self.calls.lock().push(unit.name.clone());
        if let Some(file) = self.watched.lock().as_ref() {
            let text = fs::read_to_string(file).unwrap_or_default();
            self.observed.lock().push((unit.name.clone(), text));
        }
        if self.failing.lock().contains(&unit.name) {
            bail!("syntax error in {}", unit.name);
        }

        let mut artifact = BuildArtifact::new(format!("{}@{}", unit.name, unit.commit));
        artifact.css = Some(format!(".{} {{}}", unit.name).into_bytes());
        artifact
            .assets
            .insert("img/logo.svg".into(), b"<svg/>".to_vec());
        Ok(artifact)
    }
}

/// Writes one file per package and counts installs.
#[derive(Debug, Default)]
pub struct FakeInstaller {
    installs: Mutex<usize>,
}

impl FakeInstaller {
    pub fn installs(&self) -> usize {
        *self.installs.lock()
    }
}

impl DepInstaller for FakeInstaller {
    fn install(&self, deps: &ExternalDepSet, dest: &Path) -> Result<()> {
        *self.installs.lock() += 1;
        for (name, version) in deps.iter() {
            fs::write(dest.join(name.replace('/', "__")), version)?;
        }
        Ok(())
    }
}

/// `package.json` text for a unit.
pub fn manifest(name: &str, deps: &[(&str, &str)]) -> String {
    let deps: serde_json::Map<_, _> = deps
        .iter()
        .map(|(n, v)| (n.to_string(), json!(v)))
        .collect();
    json!({ "name": name, "dependencies": deps }).to_string()
}

pub struct TestWorkspace {
    pub dir: TempDir,
    pub source: Arc<MemorySource>,
    pub bundler: Arc<FakeBundler>,
    pub installer: Arc<FakeInstaller>,
    pub config: Arc<BinderyConfig>,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = BinderyConfig::for_root(dir.path());
        Self {
            dir,
            source: Arc::new(MemorySource::new()),
            bundler: Arc::new(FakeBundler::default()),
            installer: Arc::new(FakeInstaller::default()),
            config: Arc::new(config),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Create the unit directory and commit `manifest` plus one source file
    /// on `main`.
    pub fn unit(&self, rel: &str, commit: &str, manifest: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(&path).unwrap();
        self.commit(rel, "main", commit, manifest);
        path
    }

    /// Commit a new revision of a unit. The source file embeds `commit`,
    /// so every commit has distinct content.
    pub fn commit(&self, rel: &str, branch: &str, commit: &str, manifest: &str) {
        let source = format!("export const rev = {commit:?};");
        self.source.commit(
            &self.path(rel),
            branch,
            commit,
            &[("package.json", manifest), ("src/index.ts", &source)],
        );
    }

    /// `chat` library, `chat-widget` panel on top of it, and an unrelated
    /// `settings` panel.
    pub fn chat_workspace() -> Self {
        let ws = Self::new();
        ws.unit("libs/chat", "chat@1", &manifest("chat", &[("lodash", "^4.17.0")]));
        ws.unit(
            "panels/chat-widget",
            "widget@1",
            &manifest(
                "chat-widget",
                &[("chat", "workspace:*"), ("react", "^18.2.0")],
            ),
        );
        ws.unit(
            "panels/settings",
            "settings@1",
            &manifest("settings", &[("react", "^18.2.0")]),
        );
        ws
    }

    pub fn system(&self) -> Arc<BuildSystem> {
        let collaborators = Collaborators {
            source: self.source.clone(),
            bundler: self.bundler.clone(),
            installer: self.installer.clone(),
        };
        Arc::new(BuildSystem::new(Arc::clone(&self.config), collaborators).unwrap())
    }
}
