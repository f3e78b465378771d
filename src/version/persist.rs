//! Persisted version state.
//!
//! Three JSON documents live in the state directory:
//!
//! ```text
//! {state_dir}/
//! ├── ref-state.json     # unit → last-known commit
//! ├── ev-map.json        # unit → effective version
//! └── content-map.json   # unit → content hash at that commit
//! ```
//!
//! Each file is written through a sibling temp file and renamed into
//! place, so a crash mid-write leaves the previous document intact.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{ContentMap, EvMap, RefState};

const REF_STATE_FILE: &str = "ref-state.json";
const EV_MAP_FILE: &str = "ev-map.json";
const CONTENT_MAP_FILE: &str = "content-map.json";

/// Everything the orchestrator needs to resume after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub refs: RefState,
    pub ev_map: EvMap,
    pub contents: ContentMap,
}

/// Reader/writer for the state documents in one directory.
#[derive(Debug, Clone)]
pub struct StateFiles {
    dir: PathBuf,
}

impl StateFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load all documents. Missing files load as empty maps.
    pub fn load(&self) -> Result<PersistedState> {
        let state = PersistedState {
            refs: self.read(REF_STATE_FILE)?,
            ev_map: self.read(EV_MAP_FILE)?,
            contents: self.read(CONTENT_MAP_FILE)?,
        };
        crate::debug!("persist"; "restored state for {} units", state.refs.len());
        Ok(state)
    }

    /// Write all documents; unchanged files are left untouched.
    pub fn save(&self, state: &PersistedState) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let written = [
            self.write(REF_STATE_FILE, &state.refs)?,
            self.write(EV_MAP_FILE, &state.ev_map)?,
            self.write(CONTENT_MAP_FILE, &state.contents)?,
        ];
        if written.iter().any(|w| *w) {
            crate::debug!("persist"; "saved state for {} units", state.refs.len());
        } else {
            crate::debug!("persist"; "state unchanged, skipping write");
        }
        Ok(())
    }

    fn read<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(T::default());
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("{} is corrupt", path.display()))
    }

    /// Returns whether the file was rewritten.
    fn write<T: Serialize>(&self, file: &str, value: &T) -> Result<bool> {
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(value)?;

        if file_content_matches(&path, &json) {
            return Ok(false);
        }

        let tmp = self.dir.join(format!(".{file}.{}.tmp", std::process::id()));
        fs::write(&tmp, &json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(true)
    }
}

fn file_content_matches(path: &Path, content: &str) -> bool {
    path.exists() && fs::read_to_string(path).is_ok_and(|existing| existing == content)
}
