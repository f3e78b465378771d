//! In-memory [`SourceControl`] for tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::SourceControl;
use crate::version::{ContentHash, Hasher};

#[derive(Debug, Default)]
struct Repo {
    head: String,
    /// Full ref name → commit.
    refs: FxHashMap<String, String>,
    /// Commit → file tree.
    commits: FxHashMap<String, BTreeMap<String, Vec<u8>>>,
}

/// Repositories keyed by path; commits are named by the caller.
#[derive(Debug, Default)]
pub struct MemorySource {
    repos: RwLock<FxHashMap<PathBuf, Repo>>,
    /// Paths whose content hash lookups should fail.
    broken: RwLock<Vec<PathBuf>>,
    content_reads: RwLock<Vec<(PathBuf, String)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `commit` with `files` on `branch`; main-line branches also
    /// move HEAD.
    pub fn commit(&self, repo: &Path, branch: &str, commit: &str, files: &[(&str, &str)]) {
        let mut repos = self.repos.write();
        let entry = repos.entry(repo.to_path_buf()).or_default();
        let tree = files
            .iter()
            .map(|(path, data)| (path.to_string(), data.as_bytes().to_vec()))
            .collect();
        entry.commits.insert(commit.to_string(), tree);
        entry
            .refs
            .insert(format!("refs/heads/{branch}"), commit.to_string());
        if branch == "main" {
            entry.head = commit.to_string();
        }
    }

    /// Point HEAD at `commit` without touching any branch.
    pub fn checkout(&self, repo: &Path, commit: &str) {
        if let Some(entry) = self.repos.write().get_mut(repo) {
            entry.head = commit.to_string();
        }
    }

    /// Make content hashing fail for `repo`.
    pub fn break_repo(&self, repo: &Path) {
        self.broken.write().push(repo.to_path_buf());
    }

    /// Every `(repo, commit)` whose content hash was computed.
    pub fn content_reads(&self) -> Vec<(PathBuf, String)> {
        self.content_reads.read().clone()
    }
}

impl SourceControl for MemorySource {
    fn head_commit(&self, repo: &Path) -> Result<String> {
        let repos = self.repos.read();
        let r = repos
            .get(repo)
            .ok_or_else(|| anyhow!("{} is not a repository", repo.display()))?;
        if r.head.is_empty() {
            bail!("{} has no HEAD commit", repo.display());
        }
        Ok(r.head.clone())
    }

    fn resolve(&self, repo: &Path, rev: &str) -> Result<String> {
        let repos = self.repos.read();
        let r = repos
            .get(repo)
            .ok_or_else(|| anyhow!("{} is not a repository", repo.display()))?;
        if let Some(commit) = r.refs.get(rev) {
            return Ok(commit.clone());
        }
        r.commits
            .keys()
            .find(|c| c.starts_with(rev))
            .cloned()
            .ok_or_else(|| anyhow!("cannot resolve `{rev}`"))
    }

    fn read_file(&self, repo: &Path, commit: &str, file: &str) -> Result<Option<Vec<u8>>> {
        let repos = self.repos.read();
        let tree = repos
            .get(repo)
            .and_then(|r| r.commits.get(commit))
            .ok_or_else(|| anyhow!("unknown commit `{commit}`"))?;
        Ok(tree.get(file).cloned())
    }

    fn content_hash(&self, repo: &Path, commit: &str) -> Result<ContentHash> {
        if self.broken.read().iter().any(|p| p == repo) {
            bail!("object database of {} is corrupt", repo.display());
        }
        self.content_reads
            .write()
            .push((repo.to_path_buf(), commit.to_string()));

        let repos = self.repos.read();
        let tree = repos
            .get(repo)
            .and_then(|r| r.commits.get(commit))
            .ok_or_else(|| anyhow!("unknown commit `{commit}`"))?;
        let mut hasher = Hasher::new("tree");
        for (path, data) in tree {
            hasher.str(path).field(data);
        }
        Ok(hasher.finish())
    }
}
