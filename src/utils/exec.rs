//! Running collaborator commands (bundler, dependency installer).
//!
//! ```ignore
//! Cmd::from_slice(&config.build.installer)
//!     .cwd(env_dir)
//!     .env("BINDERY_DEPS", env_dir)
//!     .filter(&INSTALL_FILTER)
//!     .run()?;
//! ```
//!
//! Stderr of a successful run is echoed through `log!` after filtering.
//! A failed run becomes an error holding the tail of its output.

use std::borrow::Cow;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;

/// Lines of stderr kept in the error of a failed run.
const ERROR_TAIL_LINES: usize = 40;

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("static regex"));

/// One external process invocation.
#[derive(Debug, Default)]
pub struct Cmd {
    argv: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, OsString)>,
    filter: Option<&'static FilterRule>,
}

impl Cmd {
    /// `cmd[0]` is the program, the rest are its arguments.
    pub fn from_slice<S: AsRef<str>>(cmd: &[S]) -> Self {
        Self {
            argv: cmd.iter().map(|s| OsString::from(s.as_ref())).collect(),
            ..Self::default()
        }
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Drop noisy lines from the echoed stderr.
    pub fn filter(mut self, filter: &'static FilterRule) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn run(self) -> Result<Output> {
        let Some((program, args)) = self.argv.split_first() else {
            bail!("empty command");
        };
        let name = program.to_string_lossy().into_owned();

        let mut cmd = Command::new(program);
        cmd.args(args).envs(self.envs.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .with_context(|| format!("failed to execute `{name}`"))?;

        let filter = self.filter.unwrap_or(&FilterRule::NONE);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            bail!(failure_message(&name, &output, &stderr, filter));
        }

        let echoed = filter.keep(&stderr);
        if !echoed.is_empty() {
            crate::log!(&name; "{}", echoed.join("\n"));
        }
        Ok(output)
    }
}

/// Line prefixes hidden from echoed and reported output.
#[derive(Debug)]
pub struct FilterRule {
    skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    pub const NONE: Self = Self::new(&[]);

    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    fn skips(&self, line: &str) -> bool {
        line.is_empty() || self.skip_prefixes.iter().any(|p| line.starts_with(p))
    }

    /// Non-empty, de-colored lines of `output` that pass the filter.
    fn keep(&self, output: &str) -> Vec<String> {
        output
            .lines()
            .map(|line| strip_ansi(line).trim().to_string())
            .filter(|line| !self.skips(line))
            .collect()
    }
}

fn strip_ansi(s: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(s, "")
}

fn failure_message(name: &str, output: &Output, stderr: &str, filter: &FilterRule) -> String {
    let mut lines = filter.keep(stderr);
    if lines.is_empty() {
        // Some bundlers report errors on stdout only.
        lines = FilterRule::NONE.keep(&String::from_utf8_lossy(&output.stdout));
    }
    let tail = &lines[lines.len().saturating_sub(ERROR_TAIL_LINES)..];

    let mut msg = format!("`{name}` exited with {}", output.status);
    if !tail.is_empty() {
        msg.push('\n');
        msg.push_str(&tail.join("\n"));
    }
    msg
}
