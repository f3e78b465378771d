//! `[workspace]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [workspace]
//! root = "."                        # Directory holding the unit roots
//! state_dir = ".bindery"            # State documents and caches
//! manifest = "package.json"         # Manifest read from each unit
//! main_branches = ["main", "master"]
//!
//! [[workspace.roots]]
//! path = "libs"
//! kind = "library"
//!
//! [[workspace.roots]]
//! path = "panels"
//! kind = "panel"
//! ```
//!
//! Every direct subdirectory of a root is a candidate unit repository.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;
use crate::config::util::resolve_path;
use crate::graph::UnitKind;
use crate::vcs::normalize_branch;

/// A directory of unit repositories that share a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    pub path: PathBuf,
    pub kind: UnitKind,
}

impl RootConfig {
    pub fn new(path: impl Into<PathBuf>, kind: UnitKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub manifest: String,
    pub main_branches: Vec<String>,
    pub roots: Vec<RootConfig>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            state_dir: PathBuf::from(".bindery"),
            manifest: "package.json".into(),
            main_branches: vec!["main".into(), "master".into()],
            roots: vec![
                RootConfig::new("libs", UnitKind::Library),
                RootConfig::new("panels", UnitKind::Panel),
                RootConfig::new("agents", UnitKind::Agent),
            ],
        }
    }
}

impl WorkspaceConfig {
    /// Resolve every path against `base` (the config file's directory).
    pub fn normalize(&mut self, base: &Path) {
        self.root = resolve_path(&self.root, base);
        self.state_dir = resolve_path(&self.state_dir, &self.root);
        for root in &mut self.roots {
            root.path = resolve_path(&root.path, &self.root);
        }
    }

    /// Position of `branch` in `main_branches`; lower is preferred.
    pub fn main_branch_rank(&self, branch: &str) -> Option<usize> {
        let branch = normalize_branch(branch);
        self.main_branches.iter().position(|b| b == branch)
    }

    /// Absolute repository path for a push: absolute paths are kept,
    /// relative ones are taken from the workspace root.
    pub fn resolve_repo(&self, repo: &Path) -> PathBuf {
        resolve_path(repo, &self.root)
    }

    pub fn builds_dir(&self) -> PathBuf {
        self.state_dir.join("builds")
    }

    pub fn deps_dir(&self) -> PathBuf {
        self.state_dir.join("deps")
    }

    /// Scratch space for bundler output.
    pub fn work_dir(&self) -> PathBuf {
        self.state_dir.join("work")
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.roots.is_empty() {
            diag.error("workspace.roots", "no unit roots configured");
        }
        if self.main_branches.is_empty() {
            diag.error_with_hint(
                "workspace.main_branches",
                "no main branches configured",
                "use [\"main\"] to track the default branch",
            );
        }
        if self.manifest.trim().is_empty() {
            diag.error("workspace.manifest", "manifest file name is empty");
        }
        for root in &self.roots {
            if !root.path.is_dir() {
                diag.warn(
                    "workspace.roots",
                    format!("{} does not exist, no {} units there", root.path.display(), root.kind),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_workspace_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.workspace.manifest, "package.json");
        assert_eq!(config.workspace.main_branches, ["main", "master"]);
        assert_eq!(config.workspace.roots.len(), 3);
    }

    #[test]
    fn test_workspace_roots() {
        let config = test_parse_config(
            "[workspace]\nmain_branches = [\"trunk\"]\n\
             [[workspace.roots]]\npath = \"apps\"\nkind = \"agent\"\n",
        );
        assert_eq!(config.workspace.roots, [RootConfig::new("apps", UnitKind::Agent)]);
        assert_eq!(config.workspace.main_branch_rank("refs/heads/trunk"), Some(0));
        assert_eq!(config.workspace.main_branch_rank("main"), None);
    }

    #[test]
    fn test_main_branch_rank() {
        let ws = WorkspaceConfig::default();
        assert_eq!(ws.main_branch_rank("main"), Some(0));
        assert_eq!(ws.main_branch_rank("refs/heads/master"), Some(1));
        assert_eq!(ws.main_branch_rank("feature"), None);
    }

    #[test]
    fn test_normalize() {
        let mut ws = WorkspaceConfig {
            root: "repos".into(),
            ..Default::default()
        };
        ws.normalize(Path::new("/srv"));
        assert_eq!(ws.root, PathBuf::from("/srv/repos"));
        assert_eq!(ws.state_dir, PathBuf::from("/srv/repos/.bindery"));
        assert_eq!(ws.roots[1].path, PathBuf::from("/srv/repos/panels"));
        assert_eq!(ws.builds_dir(), PathBuf::from("/srv/repos/.bindery/builds"));
        assert_eq!(ws.resolve_repo(Path::new("panels/chat")), PathBuf::from("/srv/repos/panels/chat"));
        assert_eq!(ws.resolve_repo(Path::new("/x/chat")), PathBuf::from("/x/chat"));
    }

    #[test]
    fn test_empty_roots_rejected() {
        let ws = WorkspaceConfig {
            roots: vec![],
            ..Default::default()
        };
        let mut diag = ConfigDiagnostics::new();
        ws.validate(&mut diag);
        assert_eq!(diag.errors().len(), 1);
    }
}
