//! Unit manifests (`package.json` by default).

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::graph::BuildSettings;
use crate::vcs::SourceControl;

/// The parts of a manifest that shape the graph and the build.
///
/// Everything else in the file (scripts, dev tooling, ...) is ignored, so a
/// manifest edit that only touches those fields keeps the fast path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub bindery: BuildSettings,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(bytes).context("malformed manifest")?;
        if manifest.name.trim().is_empty() {
            bail!("manifest has an empty `name`");
        }
        Ok(manifest)
    }
}

/// Read and parse the manifest `file` of `repo` at `commit`.
///
/// `Ok(None)` if the commit has no such file.
pub fn read_manifest_at(
    source: &dyn SourceControl,
    repo: &Path,
    commit: &str,
    file: &str,
) -> Result<Option<Manifest>> {
    let Some(bytes) = source.read_file(repo, commit, file)? else {
        return Ok(None);
    };
    let manifest = Manifest::parse(&bytes)
        .with_context(|| format!("{} in {} at {}", file, repo.display(), commit))?;
    Ok(Some(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RefPin;
    use crate::vcs::memory::MemorySource;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(
            br#"{
                "name": "chat-widget",
                "version": "1.0.0",
                "scripts": {"dev": "vite"},
                "dependencies": {"chat": "workspace:*", "react": "^18.2.0"},
                "bindery": {"sourcemap": true, "depRefs": {"chat": {"branch": "next"}}}
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.name, "chat-widget");
        assert_eq!(manifest.dependencies.len(), 2);
        assert!(manifest.bindery.sourcemap);
        assert_eq!(
            manifest.bindery.dep_refs["chat"],
            RefPin::Branch("next".into())
        );
    }

    #[test]
    fn test_irrelevant_fields_compare_equal() {
        let a = Manifest::parse(br#"{"name":"a","scripts":{"x":"1"}}"#).unwrap();
        let b = Manifest::parse(br#"{"name":"a","scripts":{"x":"2"}}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_bad_manifests() {
        assert!(Manifest::parse(b"{not json").is_err());
        assert!(Manifest::parse(br#"{"dependencies":{}}"#).is_err());
        assert!(Manifest::parse(br#"{"name":"  "}"#).is_err());
    }

    #[test]
    fn test_read_manifest_at_commit() {
        let source = MemorySource::new();
        let repo = Path::new("/ws/libs/ui");
        source.commit(repo, "main", "c1", &[("package.json", r#"{"name":"ui"}"#)]);
        source.commit(repo, "main", "c2", &[("src/index.ts", "export {}")]);

        let manifest = read_manifest_at(&source, repo, "c1", "package.json").unwrap();
        assert_eq!(manifest.unwrap().name, "ui");
        assert!(read_manifest_at(&source, repo, "c2", "package.json").unwrap().is_none());
        assert!(read_manifest_at(&source, repo, "c9", "package.json").is_err());
    }
}
