//! Bindery - incremental, content-addressed builds for panel, agent and library workspaces.

#![allow(dead_code)]

mod bundler;
mod cli;
mod config;
mod deps;
mod graph;
mod logger;
mod orchestrator;
mod store;
mod system;
mod utils;
mod vcs;
mod version;
mod workspace;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::BinderyConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {}
    }

    // Other commands keep the default Ctrl+C behavior.
    if cli.is_serve() {
        cli::serve::setup_shutdown_handler()?;
    }

    let config = Arc::new(BinderyConfig::load(&cli)?);

    match cli.command {
        Commands::Build => cli::run_build(config),
        Commands::Serve { .. } => cli::run_serve(config),
        Commands::Push {
            repo,
            branch,
            commit,
        } => cli::run_push(config, repo, branch, commit),
        Commands::Versions { pretty } => cli::run_versions(config, pretty),
        Commands::Status { pretty } => cli::run_status(config, pretty),
        Commands::Gc { units } => cli::run_gc(config, units),
    }
}
