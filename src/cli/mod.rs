//! Command-line interface module.

mod args;
mod commands;
pub mod serve;

pub use args::{Cli, Commands};
pub use commands::{run_build, run_gc, run_push, run_serve, run_status, run_versions};
