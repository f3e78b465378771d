//! Workspace discovery: unit repositories and their manifests.
//!
//! Manifests are read from each repository's head commit through
//! [`SourceControl`](crate::vcs::SourceControl), never from the checkout.

mod discovery;
mod manifest;

pub use discovery::discover;
pub use manifest::{Manifest, read_manifest_at};
