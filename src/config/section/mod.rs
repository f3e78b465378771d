//! Configuration section definitions.
//!
//! | Module      | TOML Section    | Purpose                               |
//! |-------------|-----------------|---------------------------------------|
//! | `workspace` | `[workspace]`   | Unit roots, state dir, main branches  |
//! | `build`     | `[build]`       | Bundler and installer commands, jobs  |
//! | `serve`     | `[serve]`       | HTTP interface and port               |

mod build;
mod serve;
mod workspace;

pub use build::BuildConfig;
pub use serve::ServeConfig;
pub use workspace::{RootConfig, WorkspaceConfig};
