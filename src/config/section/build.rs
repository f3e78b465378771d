//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! bundler = ["node", "scripts/bundle.mjs", "--out", "$BINDERY_OUT"]
//! installer = ["npm", "install", "--no-audit", "--no-fund"]
//! jobs = 4                    # Parallel builds (0 = one per core)
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

/// Runners that fetch packages on demand; a missing package is only a hint.
const PACKAGE_RUNNERS: &[&str] = &["npx", "bunx", "pnpx", "yarn", "dlx"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub bundler: Vec<String>,
    pub installer: Vec<String>,
    pub jobs: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            bundler: vec!["npx".into(), "bindery-bundle".into()],
            installer: vec![
                "npm".into(),
                "install".into(),
                "--no-audit".into(),
                "--no-fund".into(),
            ],
            jobs: 0,
        }
    }
}

impl BuildConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        check_command("build.bundler", &self.bundler, diag);
        check_command("build.installer", &self.installer, diag);
    }
}

fn check_command(field: &'static str, command: &[String], diag: &mut ConfigDiagnostics) {
    let Some(program) = command.first() else {
        diag.error(field, "command is empty");
        return;
    };

    if which::which(program).is_err() {
        if PACKAGE_RUNNERS.contains(&program.as_str()) {
            diag.warn(field, format!("`{program}` not found on PATH"));
        } else {
            diag.error_with_hint(
                field,
                format!("`{program}` not found"),
                format!("install the command or update {field}"),
            );
        }
    }
}
