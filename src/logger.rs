//! Terminal logging.
//!
//! Every line goes to stderr as `[module] message`, the prefix colored by
//! module. `debug!` lines only appear with `--verbose`.
//!
//! ```ignore
//! log!("push"; "{} @ {} -> fast path", unit, commit);
//! debug!("ev"; "{} = {}", name, ev);
//! ```

use std::io::{Write, stderr};
use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::OwoColorize;

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

/// Write one prefixed line. Stdout stays free for JSON output.
pub fn log(module: &str, message: &str) {
    let prefix = format!("[{module}]");
    let prefix = match module {
        "serve" => prefix.bright_blue().bold().to_string(),
        "push" | "change" => prefix.bright_green().bold().to_string(),
        "build" | "start" => prefix.bright_cyan().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        "debug" | "event" => prefix.dimmed().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    };

    let mut out = stderr().lock();
    let _ = writeln!(out, "{prefix} {message}");
    let _ = out.flush();
}

// ============================================================================
// Batch Report
// ============================================================================

/// Counters for one build batch, printed as a single summary line.
///
/// ```text
/// [build] ✓ 3 built  · 2 cached  ✗ 1 failed
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub built: usize,
    pub cached: usize,
    pub failed: usize,
}

impl BatchReport {
    pub const fn new() -> Self {
        Self {
            built: 0,
            cached: 0,
            failed: 0,
        }
    }

    pub const fn total(&self) -> usize {
        self.built + self.cached + self.failed
    }

    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// Print the summary line (nothing for an empty batch).
    pub fn print(&self) {
        if self.total() == 0 {
            return;
        }
        log("build", &self.render());
    }

    fn render(&self) -> String {
        let mut line = format!("{} {} built", "✓".green(), self.built);
        if self.cached > 0 {
            line.push_str(&format!("  {} {} cached", "·".dimmed(), self.cached));
        }
        if self.failed > 0 {
            line.push_str(&format!("  {} {} failed", "✗".red(), self.failed));
        }
        line
    }
}
