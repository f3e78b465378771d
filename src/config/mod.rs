//! Workspace configuration management for `bindery.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [workspace], [build], [serve]
//! ├── error          # ConfigError, ConfigDiagnostics
//! ├── util           # config discovery, path resolution
//! └── mod.rs         # BinderyConfig (this file)
//! ```
//!
//! The config file is searched upward from the current directory. All
//! relative paths are resolved against the directory holding it.

mod error;
pub mod section;
mod util;

pub use error::{ConfigDiagnostic, ConfigDiagnostics, ConfigError};
pub use section::{BuildConfig, RootConfig, ServeConfig, WorkspaceConfig};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, Commands};
use crate::log;
use util::find_config_file;

/// Root configuration structure representing bindery.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BinderyConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    pub workspace: WorkspaceConfig,
    pub build: BuildConfig,
    pub serve: ServeConfig,
}

impl BinderyConfig {
    /// Load configuration for a CLI invocation.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path =
            find_config_file(&cli.config).ok_or_else(|| ConfigError::NotFound(cli.config.clone()))?;

        let mut config = Self::from_path(&path)?;
        config.config_path = path;
        config.finalize();
        config.apply_cli(cli);
        config.validate()?;

        crate::debug!("config"; "workspace root {}", config.workspace.root.display());
        Ok(config)
    }

    /// Default configuration rooted at `root`, with paths resolved.
    pub fn for_root(root: &Path) -> Self {
        let mut config = Self {
            config_path: root.join("bindery.toml"),
            ..Self::default()
        };
        config.finalize();
        config
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Resolve paths against the config file's directory.
    fn finalize(&mut self) {
        let base = self
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.workspace.normalize(&base);
    }

    /// Apply command-line overrides.
    fn apply_cli(&mut self, cli: &Cli) {
        crate::logger::set_verbose(cli.verbose);

        if let Some(jobs) = cli.jobs {
            self.build.jobs = jobs;
        }
        if let Commands::Serve { interface, port } = &cli.command {
            if let Some(interface) = interface {
                self.serve.interface = *interface;
            }
            if let Some(port) = port {
                self.serve.port = *port;
            }
        }
    }

    /// Validate configuration, collecting all errors at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();
        self.workspace.validate(&mut diag);
        self.build.validate(&mut diag);
        diag.into_result()
    }

    /// Project root directory
    pub fn root(&self) -> &Path {
        &self.workspace.root
    }
}

/// Parse a config snippet, failing on unknown fields.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> BinderyConfig {
    let (parsed, ignored) = BinderyConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}
