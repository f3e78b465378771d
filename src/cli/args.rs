//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Incremental build orchestrator for panel, agent and library workspaces
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path, searched upward from the current directory
    #[arg(short = 'C', long, default_value = "bindery.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Parallel builds (0 = one per core)
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Discover the workspace and build every unit missing from the store
    #[command(visible_alias = "b")]
    Build,

    /// Build, then accept push webhooks and serve artifacts over HTTP
    #[command(visible_alias = "s")]
    Serve {
        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Process one push event in-process and print the outcome
    #[command(visible_alias = "p")]
    Push {
        /// Repository path, absolute or relative to the workspace root
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        repo: PathBuf,

        /// Pushed branch (`main` or `refs/heads/main`)
        #[arg(long)]
        branch: String,

        /// Pushed commit
        #[arg(long)]
        commit: String,
    },

    /// Print the effective version of every unit as JSON
    Versions {
        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Print buildable units with their build keys and store state
    Status {
        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Remove stored builds not belonging to the given units
    Gc {
        /// Units whose current builds are kept (default: every buildable unit)
        units: Vec<String>,
    },
}

impl Cli {
    pub const fn is_serve(&self) -> bool {
        matches!(self.command, Commands::Serve { .. })
    }
}
