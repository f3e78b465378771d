//! Collaborators that turn source into artifacts.
//!
//! The orchestrator never bundles or installs anything itself. It hands a
//! [`BundleRequest`] to a [`Bundler`] and an [`ExternalDepSet`] to a
//! [`DepInstaller`]; the command-running implementations here wrap whatever
//! tools the workspace configures.

mod command;

pub use command::{CommandBundler, CommandInstaller};

use std::path::Path;

use anyhow::Result;

use crate::deps::ExternalDepSet;
use crate::graph::Unit;
use crate::store::{BuildArtifact, BuildFlags};

/// Everything a bundler needs to build one unit.
#[derive(Debug, Clone, Copy)]
pub struct BundleRequest<'a> {
    pub unit: &'a Unit,
    /// Installed external dependencies for the unit.
    pub deps_env: &'a Path,
    pub flags: BuildFlags,
}

/// Turns a unit's source at its commit into an artifact.
pub trait Bundler: Send + Sync {
    fn bundle(&self, request: &BundleRequest<'_>) -> Result<BuildArtifact>;
}

/// Installs an external dependency set into an empty directory.
pub trait DepInstaller: Send + Sync {
    fn install(&self, deps: &ExternalDepSet, dest: &Path) -> Result<()>;
}
