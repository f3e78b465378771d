//! Read-only access to unit repositories.
//!
//! Everything the orchestrator needs from version control goes through
//! [`SourceControl`]: manifests and content hashes are always read from a
//! commit object, never from a live checkout, so a push can be evaluated
//! while the working tree is still at an older revision.

mod git;
#[cfg(test)]
pub mod memory;

pub use git::GitSource;

use std::path::Path;

use anyhow::Result;

use crate::version::ContentHash;

/// Version-control operations on a single unit repository.
pub trait SourceControl: Send + Sync {
    /// Commit the repository's HEAD points at.
    fn head_commit(&self, repo: &Path) -> Result<String>;

    /// Resolve a revision spec (`refs/heads/x`, `refs/tags/y`, a sha) to a commit.
    fn resolve(&self, repo: &Path, rev: &str) -> Result<String>;

    /// Read a file from the tree of `commit`. `Ok(None)` if the path is absent.
    fn read_file(&self, repo: &Path, commit: &str, file: &str) -> Result<Option<Vec<u8>>>;

    /// Hash of the complete source tree at `commit`.
    fn content_hash(&self, repo: &Path, commit: &str) -> Result<ContentHash>;
}

/// Strip `refs/heads/` so pushes and pins compare on plain branch names.
pub fn normalize_branch(branch: &str) -> &str {
    branch.strip_prefix("refs/heads/").unwrap_or(branch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_branch() {
        assert_eq!(normalize_branch("refs/heads/main"), "main");
        assert_eq!(normalize_branch("main"), "main");
        assert_eq!(normalize_branch("refs/tags/v1"), "refs/tags/v1");
    }
}
