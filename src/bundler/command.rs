//! Collaborators backed by external commands.
//!
//! Commands receive their inputs as `$BINDERY_*` environment variables.
//! Occurrences of `$BINDERY_XXX` inside configured arguments are replaced
//! with the same values, so `["esbuild", "$BINDERY_SOURCE/index.ts"]` works
//! without a wrapper script.
//!
//! The bundler runs in the unit's checkout, which may lag behind the commit
//! being built. Bundlers must build `$BINDERY_COMMIT` (for example from a
//! `git worktree` or `git archive` of it), not the working tree. Resolved
//! dependency pins arrive as a JSON object in `$BINDERY_PINS`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use jwalk::WalkDir;
use rustc_hash::FxHashMap;

use super::{BundleRequest, Bundler, DepInstaller};
use crate::deps::ExternalDepSet;
use crate::store::{BuildArtifact, promote};
use crate::utils::exec::{Cmd, FilterRule};

const BUNDLE_FILE: &str = "bundle.js";
const CSS_FILE: &str = "style.css";
const HTML_FILE: &str = "index.html";
const ASSETS_DIR: &str = "assets";

/// Noise from common installers.
static INSTALL_FILTER: FilterRule = FilterRule::new(&["npm WARN", "npm notice", "Progress:"]);

// ============================================================================
// Bundler
// ============================================================================

/// Runs a bundling command per unit.
///
/// The command writes `bundle.js` (required), `style.css`, `index.html` and
/// `assets/**` (optional) into `$BINDERY_OUT`.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    command: Vec<String>,
    /// Scratch space for output directories.
    work_dir: PathBuf,
}

impl CommandBundler {
    pub fn new(command: Vec<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            work_dir: work_dir.into(),
        }
    }

    fn run(&self, request: &BundleRequest<'_>, out: &Path) -> Result<BuildArtifact> {
        let vars = bundle_vars(request, out)?;
        let args = resolve_args(&self.command, &vars);

        let mut cmd = Cmd::from_slice(&args).cwd(&request.unit.path);
        for (key, value) in &vars {
            cmd = cmd.env(key, value);
        }
        cmd.run()
            .with_context(|| format!("bundler failed for `{}`", request.unit.name))?;

        read_output(out)
    }
}

impl Bundler for CommandBundler {
    fn bundle(&self, request: &BundleRequest<'_>) -> Result<BuildArtifact> {
        let out = promote::temp_dir(&self.work_dir)
            .with_context(|| format!("failed to create output dir in {}", self.work_dir.display()))?;
        let result = self.run(request, &out);
        promote::discard(&out);
        result
    }
}

/// `$BINDERY_*` variables for one bundle run.
fn bundle_vars(request: &BundleRequest<'_>, out: &Path) -> Result<FxHashMap<String, String>> {
    let unit = request.unit;
    let mut vars = FxHashMap::default();

    vars.insert("BINDERY_UNIT".into(), unit.name.clone());
    vars.insert("BINDERY_KIND".into(), unit.kind.as_str().into());
    vars.insert("BINDERY_SOURCE".into(), unit.path.display().to_string());
    vars.insert("BINDERY_COMMIT".into(), unit.commit.clone());
    vars.insert(
        "BINDERY_PINS".into(),
        serde_json::to_string(&unit.pinned).context("failed to encode pins")?,
    );
    vars.insert("BINDERY_DEPS".into(), request.deps_env.display().to_string());
    vars.insert("BINDERY_OUT".into(), out.display().to_string());
    vars.insert(
        "BINDERY_SOURCEMAP".into(),
        request.flags.sourcemap.to_string(),
    );

    Ok(vars)
}

/// Replace `$BINDERY_XXX` in arguments.
///
/// Longer names are substituted first so `$BINDERY_OUT` never eats the
/// prefix of a longer variable.
fn resolve_args(args: &[String], vars: &FxHashMap<String, String>) -> Vec<String> {
    let mut keys: Vec<&String> = vars.keys().collect();
    keys.sort_by_key(|k| std::cmp::Reverse(k.len()));

    args.iter()
        .map(|arg| {
            keys.iter().fold(arg.clone(), |acc, key| {
                acc.replace(&format!("${key}"), &vars[*key])
            })
        })
        .collect()
}

/// Collect the files a bundler left in `out`.
fn read_output(out: &Path) -> Result<BuildArtifact> {
    let bundle_path = out.join(BUNDLE_FILE);
    if !bundle_path.is_file() {
        bail!("bundler produced no {BUNDLE_FILE}");
    }

    let optional = |name: &str| -> Result<Option<Vec<u8>>> {
        let path = out.join(name);
        if path.is_file() {
            Ok(Some(fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?))
        } else {
            Ok(None)
        }
    };

    Ok(BuildArtifact {
        bundle: fs::read(&bundle_path)?,
        css: optional(CSS_FILE)?,
        html: optional(HTML_FILE)?,
        assets: read_assets(&out.join(ASSETS_DIR))?,
    })
}

/// Every file under `dir`, keyed by its `/`-separated relative path.
fn read_assets(dir: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut assets = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(assets);
    }

    for entry in WalkDir::new(dir).skip_hidden(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        assets.insert(name, bytes);
    }

    Ok(assets)
}

// ============================================================================
// Installer
// ============================================================================

/// Writes a `package.json` listing the set, then runs the install command in
/// that directory.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    command: Vec<String>,
}

impl CommandInstaller {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl DepInstaller for CommandInstaller {
    fn install(&self, deps: &ExternalDepSet, dest: &Path) -> Result<()> {
        let manifest = serde_json::json!({
            "name": "bindery-env",
            "private": true,
            "dependencies": deps,
        });
        fs::write(dest.join("package.json"), serde_json::to_string_pretty(&manifest)?)
            .context("failed to write package.json")?;

        if deps.is_empty() || self.command.is_empty() {
            return Ok(());
        }

        let mut vars = FxHashMap::default();
        vars.insert("BINDERY_DEPS".to_string(), dest.display().to_string());
        let args = resolve_args(&self.command, &vars);

        Cmd::from_slice(&args)
            .cwd(dest)
            .env("BINDERY_DEPS", dest)
            .filter(&INSTALL_FILTER)
            .run()
            .context("dependency install failed")?;
        Ok(())
    }
}
