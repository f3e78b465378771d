//! Configuration errors and validation diagnostics.

use std::fmt;
use std::path::PathBuf;

use owo_colors::OwoColorize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no `{0}` found in this directory or any parent")]
    NotFound(PathBuf),

    #[error("cannot read `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid config")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(ConfigDiagnostics),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One problem with one config field.
#[derive(Debug, Clone)]
pub struct ConfigDiagnostic {
    pub severity: Severity,
    /// Dotted field path, e.g. `build.bundler`.
    pub field: &'static str,
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {}: {}", self.field.cyan(), self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({} {})", "hint:".yellow(), hint)?;
        }
        Ok(())
    }
}

/// Every problem found by one validation pass.
#[derive(Debug, Default)]
pub struct ConfigDiagnostics(Vec<ConfigDiagnostic>);

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, severity: Severity, field: &'static str, message: String, hint: Option<String>) {
        self.0.push(ConfigDiagnostic {
            severity,
            field,
            message,
            hint,
        });
    }

    pub fn error(&mut self, field: &'static str, message: impl Into<String>) {
        self.push(Severity::Error, field, message.into(), None);
    }

    pub fn error_with_hint(
        &mut self,
        field: &'static str,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.push(Severity::Error, field, message.into(), Some(hint.into()));
    }

    pub fn warn(&mut self, field: &'static str, message: impl Into<String>) {
        self.push(Severity::Warning, field, message.into(), None);
    }

    fn of(&self, severity: Severity) -> impl Iterator<Item = &ConfigDiagnostic> {
        self.0.iter().filter(move |d| d.severity == severity)
    }

    pub fn errors(&self) -> Vec<&ConfigDiagnostic> {
        self.of(Severity::Error).collect()
    }

    pub fn warnings(&self) -> Vec<&ConfigDiagnostic> {
        self.of(Severity::Warning).collect()
    }

    /// Log warnings; fail if any error was recorded.
    pub fn into_result(self) -> Result<(), ConfigError> {
        for warning in self.of(Severity::Warning) {
            crate::log!("warning"; "{}: {}", warning.field, warning.message);
        }
        if self.of(Severity::Error).next().is_none() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(self))
        }
    }
}

impl fmt::Display for ConfigDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", "invalid config:".red().bold())?;
        for error in self.of(Severity::Error) {
            write!(f, "\n{error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_do_not_fail() {
        let mut diag = ConfigDiagnostics::new();
        diag.warn("workspace.roots", "agents does not exist");
        assert_eq!(diag.warnings().len(), 1);
        assert!(diag.into_result().is_ok());
    }

    #[test]
    fn test_errors_are_all_reported() {
        let mut diag = ConfigDiagnostics::new();
        diag.error("workspace.roots", "no unit roots configured");
        diag.error_with_hint("build.bundler", "`esbuild` not found", "install it");

        let err = diag.into_result().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("workspace.roots"));
        assert!(text.contains("no unit roots configured"));
        assert!(text.contains("`esbuild` not found"));
        assert!(text.contains("install it"));
    }
}
