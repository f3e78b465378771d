//! Graph nodes: workspace units and their build-relevant settings.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::store::BuildFlags;
use crate::version::ContentHash;

/// What a unit is. Panels and agents are buildable, libraries are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Library,
    Panel,
    Agent,
}

impl UnitKind {
    /// Buildable units produce artifacts; libraries only feed their dependents.
    pub const fn is_buildable(self) -> bool {
        !matches!(self, Self::Library)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Library => "library",
            Self::Panel => "panel",
            Self::Agent => "agent",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pin of an internal dependency to something other than its main branch.
///
/// Deserializes from `{"branch": "next"}`, `{"ref": "refs/tags/v2"}` or
/// `{"commit": "3f2a..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefPin {
    Branch(String),
    Ref(String),
    Commit(String),
}

impl RefPin {
    /// Revision spec understood by the VCS layer.
    pub fn rev_spec(&self) -> String {
        match self {
            Self::Branch(branch) => format!("refs/heads/{branch}"),
            Self::Ref(r) => r.clone(),
            Self::Commit(sha) => sha.clone(),
        }
    }

    /// Whether a push of `commit` to `branch` (already normalized, without
    /// `refs/heads/`) moves what this pin points at.
    pub fn matches_push(&self, branch: &str, commit: &str) -> bool {
        match self {
            Self::Branch(b) => b == branch,
            Self::Ref(r) => {
                r == branch || r.strip_prefix("refs/heads/").is_some_and(|b| b == branch)
            }
            Self::Commit(sha) => !sha.is_empty() && commit.starts_with(sha.as_str()),
        }
    }
}

/// Build configuration block of a unit manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildSettings {
    /// Emit source maps alongside the bundle.
    pub sourcemap: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    /// Internal dependencies pinned to a branch, ref or commit.
    pub dep_refs: BTreeMap<String, RefPin>,
}

/// A unit of the workspace graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    /// Absolute location of the unit's repository.
    pub path: PathBuf,
    /// Location relative to the workspace root.
    pub relative_path: PathBuf,
    pub kind: UnitKind,
    /// Every declared dependency, internal and external.
    pub declared_deps: BTreeMap<String, String>,
    /// Declared dependencies that resolve to other workspace units.
    pub internal_deps: BTreeSet<String>,
    /// Commits the `dep_refs` pins resolved to at discovery time.
    pub pinned: BTreeMap<String, String>,
    /// Main branch the unit was read from; `None` when read at HEAD.
    pub branch: Option<String>,
    /// Commit the unit was read at.
    pub commit: String,
    /// Hash of the source tree at `commit`; empty until resolved.
    pub content_hash: ContentHash,
    pub settings: BuildSettings,
}

impl Unit {
    pub fn new(name: impl Into<String>, kind: UnitKind) -> Self {
        let name = name.into();
        Self {
            path: PathBuf::from(&name),
            relative_path: PathBuf::from(&name),
            name,
            kind,
            declared_deps: BTreeMap::new(),
            internal_deps: BTreeSet::new(),
            pinned: BTreeMap::new(),
            branch: None,
            commit: String::new(),
            content_hash: ContentHash::empty(),
            settings: BuildSettings::default(),
        }
    }

    pub fn is_buildable(&self) -> bool {
        self.kind.is_buildable()
    }

    /// Build flags derived from the unit's settings.
    pub fn flags(&self) -> BuildFlags {
        BuildFlags {
            sourcemap: self.settings.sourcemap,
        }
    }

    /// Pins on internal dependencies, keyed by dependency name.
    pub fn dep_refs(&self) -> &BTreeMap<String, RefPin> {
        &self.settings.dep_refs
    }
}
