//! `gix`-backed [`SourceControl`].

use std::path::Path;

use anyhow::{Context, Result};
use gix::Repository;

use super::SourceControl;
use crate::version::{ContentHash, Hasher};

/// Reads unit repositories from disk.
///
/// Repositories are opened per call: pushes land concurrently with reads,
/// and a fresh handle always sees the latest refs and packs.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitSource;

impl GitSource {
    pub const fn new() -> Self {
        Self
    }
}

impl SourceControl for GitSource {
    fn head_commit(&self, repo: &Path) -> Result<String> {
        let repo = open_repo(repo)?;
        let id = repo
            .head_id()
            .with_context(|| format!("{} has no HEAD commit", display(&repo)))?;
        Ok(id.detach().to_string())
    }

    fn resolve(&self, repo: &Path, rev: &str) -> Result<String> {
        let repo = open_repo(repo)?;
        let id = repo
            .rev_parse_single(rev)
            .with_context(|| format!("cannot resolve `{rev}` in {}", display(&repo)))?;
        Ok(id.detach().to_string())
    }

    fn read_file(&self, repo: &Path, commit: &str, file: &str) -> Result<Option<Vec<u8>>> {
        let repo = open_repo(repo)?;
        let commit = find_commit(&repo, commit)?;
        let mut tree = commit
            .tree()
            .with_context(|| format!("cannot read tree of {}", commit.id))?;

        let Some(entry) = tree
            .peel_to_entry_by_path(file)
            .with_context(|| format!("cannot look up `{file}` at {}", commit.id))?
        else {
            return Ok(None);
        };

        let object = entry
            .object()
            .with_context(|| format!("cannot read `{file}` at {}", commit.id))?;
        Ok(Some(object.detach().data))
    }

    fn content_hash(&self, repo: &Path, commit: &str) -> Result<ContentHash> {
        let repo = open_repo(repo)?;
        let commit = find_commit(&repo, commit)?;
        let tree_id = commit
            .tree_id()
            .with_context(|| format!("cannot decode commit {}", commit.id))?;

        // The tree id already addresses the full source tree; rehash it so
        // content hashes share the width and domain rules of every other hash.
        Ok(Hasher::new("tree").str(&tree_id.to_string()).finish())
    }
}

/// Open the repository at `path`.
fn open_repo(path: &Path) -> Result<Repository> {
    gix::open(path).with_context(|| format!("{} is not a git repository", path.display()))
}

fn find_commit<'r>(repo: &'r Repository, commit: &str) -> Result<gix::Commit<'r>> {
    let id = repo
        .rev_parse_single(commit)
        .with_context(|| format!("unknown commit `{commit}` in {}", display(repo)))?;
    repo.find_commit(id.detach())
        .with_context(|| format!("`{commit}` is not a commit in {}", display(repo)))
}

/// Repository root for messages (parent of the `.git` directory).
fn display(repo: &Repository) -> String {
    let git_dir = repo.path();
    git_dir.parent().unwrap_or(git_dir).display().to_string()
}
