//! Content-addressed build cache.
//!
//! # Layout
//!
//! ```text
//! {root}/
//! ├── .tmp/                  # in-flight writes
//! └── {key}/
//!     ├── bundle.js
//!     ├── style.css          # optional
//!     ├── index.html         # optional
//!     ├── assets/**
//!     └── metadata.json      # sentinel, written last
//! ```
//!
//! Entries are immutable once promoted. Several processes may share one
//! root: concurrent writers of the same key resolve through [`promote`].

mod artifact;
mod key;
pub mod promote;

pub use artifact::{BuildArtifact, BuildMetadata, StoredBuild, is_valid_asset_name};
pub use key::{BuildFlags, BuildKey};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rustc_hash::FxHashSet;
use thiserror::Error;

use artifact::{ASSETS_DIR, BUNDLE_FILE, CSS_FILE, HTML_FILE, METADATA_FILE};
use promote::{PromoteError, Promotion};

/// Temp directories older than this are assumed abandoned.
const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("build {key} lost a race against an incomplete write")]
    Race { key: BuildKey },

    #[error(transparent)]
    Promote(PromoteError),

    #[error("invalid asset name `{0}`")]
    InvalidAsset(String),

    #[error("corrupt metadata at {}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Outcome of a garbage collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Key directories removed.
    pub freed: usize,
    /// Abandoned temp directories removed.
    pub temp_cleared: usize,
}

/// On-disk store of completed builds.
#[derive(Debug, Clone)]
pub struct BuildStore {
    root: PathBuf,
}

impl BuildStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &BuildKey) -> PathBuf {
        self.root.join(key.to_hex())
    }

    /// Whether a completed build exists for `key`.
    pub fn has(&self, key: &BuildKey) -> bool {
        self.key_dir(key).join(METADATA_FILE).is_file()
    }

    pub fn get(&self, key: &BuildKey) -> Result<Option<StoredBuild>, StoreError> {
        let dir = self.key_dir(key);
        let path = dir.join(METADATA_FILE);

        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(format!("failed to read {}", path.display()), e)),
        };
        let metadata = serde_json::from_str(&json)
            .map_err(|source| StoreError::Corrupt { path, source })?;

        Ok(Some(StoredBuild { dir, metadata }))
    }

    /// Store `artifact` under `key` and return the stored build.
    ///
    /// If another writer completes the same key first, its build is
    /// returned and ours is discarded.
    pub fn put(
        &self,
        key: &BuildKey,
        artifact: &BuildArtifact,
        metadata: &BuildMetadata,
    ) -> Result<StoredBuild, StoreError> {
        if let Some(name) = artifact.invalid_asset() {
            return Err(StoreError::InvalidAsset(name.to_string()));
        }
        if let Some(existing) = self.get(key)? {
            return Ok(existing);
        }

        let tmp = promote::temp_dir(&self.root).map_err(|e| {
            StoreError::io(format!("failed to create temp dir in {}", self.root.display()), e)
        })?;
        if let Err(e) = write_build(&tmp, artifact, metadata) {
            promote::discard(&tmp);
            return Err(e);
        }

        let target = self.key_dir(key);
        match promote::promote(&tmp, &target, METADATA_FILE) {
            Ok(Promotion::Installed) => {
                crate::debug!("store"; "stored {} ({})", metadata.name, key);
            }
            Ok(Promotion::LostRace) => {
                crate::debug!("store"; "{} already stored by another writer", key);
            }
            Err(PromoteError::Race { .. }) => return Err(StoreError::Race { key: *key }),
            Err(e) => return Err(StoreError::Promote(e)),
        }

        self.get(key)?.ok_or_else(|| {
            StoreError::io(
                format!("{} vanished after promotion", target.display()),
                io::Error::from(io::ErrorKind::NotFound),
            )
        })
    }

    /// Every key with a directory in the store, complete or not.
    pub fn keys(&self) -> Result<Vec<BuildKey>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::io(format!("failed to list {}", self.root.display()), e));
            }
        };

        let mut keys: Vec<BuildKey> = entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|e| BuildKey::from_hex(e.file_name().to_str()?))
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }

    /// Remove every key not in `active`, plus abandoned temp directories.
    ///
    /// Directories that are not build keys are never touched.
    pub fn gc(&self, active: &FxHashSet<BuildKey>) -> Result<GcReport, StoreError> {
        let mut report = GcReport::default();

        for key in self.keys()? {
            if active.contains(&key) {
                continue;
            }
            let dir = self.key_dir(&key);
            match fs::remove_dir_all(&dir) {
                Ok(()) => report.freed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StoreError::io(format!("failed to remove {}", dir.display()), e));
                }
            }
        }
        report.temp_cleared = promote::clear_stale_temp(&self.root, STALE_TEMP_AGE);

        crate::debug!("store"; "gc freed {} builds, cleared {} temp dirs", report.freed, report.temp_cleared);
        Ok(report)
    }
}

/// Fill `dir` with the artifact files, metadata last.
fn write_build(dir: &Path, artifact: &BuildArtifact, metadata: &BuildMetadata) -> Result<(), StoreError> {
    write_file(&dir.join(BUNDLE_FILE), &artifact.bundle)?;
    if let Some(css) = &artifact.css {
        write_file(&dir.join(CSS_FILE), css)?;
    }
    if let Some(html) = &artifact.html {
        write_file(&dir.join(HTML_FILE), html)?;
    }
    for (name, bytes) in &artifact.assets {
        write_file(&dir.join(ASSETS_DIR).join(name), bytes)?;
    }

    let json = serde_json::to_vec_pretty(metadata).map_err(|source| StoreError::Corrupt {
        path: dir.join(METADATA_FILE),
        source,
    })?;
    write_file(&dir.join(METADATA_FILE), &json)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StoreError::io(format!("failed to create {}", parent.display()), e))?;
    }
    fs::write(path, bytes).map_err(|e| StoreError::io(format!("failed to write {}", path.display()), e))
}
