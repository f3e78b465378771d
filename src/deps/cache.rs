//! Installed dependency environments, one per dependency-set hash.
//!
//! ```text
//! {root}/
//! ├── .tmp/
//! └── {hash}/
//!     ├── env/         # installer output
//!     ├── deps.json    # the set that was installed
//!     └── .ready       # sentinel, written last
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::ExternalDepSet;
use crate::bundler::DepInstaller;
use crate::store::promote::{self, PromoteError, Promotion};

const ENV_DIR: &str = "env";
const DEPS_FILE: &str = "deps.json";
const READY_FILE: &str = ".ready";

#[derive(Debug, Clone)]
pub struct DepCache {
    root: PathBuf,
}

impl DepCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, set: &ExternalDepSet) -> PathBuf {
        self.root.join(set.hash().to_hex())
    }

    /// Environment directory for `set`, whether or not it is installed.
    pub fn env_dir(&self, set: &ExternalDepSet) -> PathBuf {
        self.entry_dir(set).join(ENV_DIR)
    }

    pub fn is_ready(&self, set: &ExternalDepSet) -> bool {
        self.entry_dir(set).join(READY_FILE).is_file()
    }

    /// Return the installed environment for `set`, installing it first if
    /// needed.
    pub fn ensure(&self, set: &ExternalDepSet, installer: &dyn DepInstaller) -> Result<PathBuf> {
        let target = self.entry_dir(set);
        if self.is_ready(set) {
            return Ok(target.join(ENV_DIR));
        }

        let tmp = promote::temp_dir(&self.root)
            .with_context(|| format!("failed to create temp dir in {}", self.root.display()))?;
        if let Err(e) = install_into(&tmp, set, installer) {
            promote::discard(&tmp);
            return Err(e);
        }

        match promote::promote(&tmp, &target, READY_FILE) {
            Ok(Promotion::Installed) => {
                crate::log!("deps"; "installed {} packages ({})", set.len(), set.hash());
            }
            Ok(Promotion::LostRace) => {
                crate::debug!("deps"; "{} installed by another writer", set.hash());
            }
            Err(e @ PromoteError::Race { .. }) => {
                bail!("dependency environment {} lost a race: {e}", set.hash())
            }
            Err(e) => return Err(e).context("failed to publish dependency environment"),
        }

        Ok(target.join(ENV_DIR))
    }
}

fn install_into(tmp: &Path, set: &ExternalDepSet, installer: &dyn DepInstaller) -> Result<()> {
    let env = tmp.join(ENV_DIR);
    fs::create_dir_all(&env).with_context(|| format!("failed to create {}", env.display()))?;

    installer
        .install(set, &env)
        .with_context(|| format!("failed to install dependency set {}", set.hash()))?;

    let json = serde_json::to_string_pretty(set)?;
    fs::write(tmp.join(DEPS_FILE), json).context("failed to write deps.json")?;
    fs::write(tmp.join(READY_FILE), "").context("failed to write ready marker")?;
    Ok(())
}
