//! Build outputs and their metadata.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::key::{BuildFlags, BuildKey};
use crate::graph::UnitKind;
use crate::version::ContentHash;

pub const BUNDLE_FILE: &str = "bundle.js";
pub const CSS_FILE: &str = "style.css";
pub const HTML_FILE: &str = "index.html";
pub const ASSETS_DIR: &str = "assets";
/// Written last; its presence marks a complete build.
pub const METADATA_FILE: &str = "metadata.json";

/// Bytes produced by the bundler for one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildArtifact {
    pub bundle: Vec<u8>,
    pub css: Option<Vec<u8>>,
    pub html: Option<Vec<u8>>,
    /// Relative asset path → bytes.
    pub assets: BTreeMap<String, Vec<u8>>,
}

impl BuildArtifact {
    pub fn new(bundle: impl Into<Vec<u8>>) -> Self {
        Self {
            bundle: bundle.into(),
            ..Self::default()
        }
    }

    /// First asset name that is not a plain relative path.
    pub fn invalid_asset(&self) -> Option<&str> {
        self.assets
            .keys()
            .map(String::as_str)
            .find(|name| !is_valid_asset_name(name))
    }
}

/// Asset names must be non-empty relative paths without `..`, `.` or roots.
pub fn is_valid_asset_name(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetadata {
    pub key: BuildKey,
    pub name: String,
    pub kind: UnitKind,
    pub ev: ContentHash,
    pub flags: BuildFlags,
    /// Unix seconds.
    pub built_at: u64,
    #[serde(default)]
    pub has_css: bool,
    #[serde(default)]
    pub has_html: bool,
    #[serde(default)]
    pub assets: Vec<String>,
}

impl BuildMetadata {
    /// Metadata for `artifact`, stamped with the current time.
    pub fn new(
        key: BuildKey,
        name: impl Into<String>,
        kind: UnitKind,
        ev: ContentHash,
        flags: BuildFlags,
        artifact: &BuildArtifact,
    ) -> Self {
        Self {
            key,
            name: name.into(),
            kind,
            ev,
            flags,
            built_at: now_secs(),
            has_css: artifact.css.is_some(),
            has_html: artifact.html.is_some(),
            assets: artifact.assets.keys().cloned().collect(),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A completed build on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBuild {
    pub dir: PathBuf,
    pub metadata: BuildMetadata,
}

impl StoredBuild {
    pub fn key(&self) -> BuildKey {
        self.metadata.key
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.dir.join(BUNDLE_FILE)
    }

    pub fn css_path(&self) -> Option<PathBuf> {
        self.metadata.has_css.then(|| self.dir.join(CSS_FILE))
    }

    pub fn html_path(&self) -> Option<PathBuf> {
        self.metadata.has_html.then(|| self.dir.join(HTML_FILE))
    }

    /// Path of a stored asset, if `name` is valid and was stored.
    pub fn asset_path(&self, name: &str) -> Option<PathBuf> {
        (is_valid_asset_name(name) && self.metadata.assets.iter().any(|a| a == name))
            .then(|| self.dir.join(ASSETS_DIR).join(name))
    }

    /// Read the whole artifact back into memory.
    pub fn read(&self) -> std::io::Result<BuildArtifact> {
        let css = self.css_path().map(fs::read).transpose()?;
        let html = self.html_path().map(fs::read).transpose()?;
        let assets = self
            .metadata
            .assets
            .iter()
            .map(|name| Ok((name.clone(), fs::read(self.dir.join(ASSETS_DIR).join(name))?)))
            .collect::<std::io::Result<_>>()?;

        Ok(BuildArtifact {
            bundle: fs::read(self.bundle_path())?,
            css,
            html,
            assets,
        })
    }
}
