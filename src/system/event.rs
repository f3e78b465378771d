//! Lifecycle events published to subscribers.

use serde::Serialize;

use crate::store::BuildKey;
use crate::version::ChangeSet;

/// Broadcast to every [`subscribe`](super::BuildSystem::subscribe)r.
///
/// Slow subscribers may miss events; nothing waits on delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BuildEvent {
    BuildStarted { unit: String, key: BuildKey },
    BuildComplete { unit: String, key: BuildKey },
    BuildError { unit: String, error: String },
    /// One per batch, only when effective versions moved.
    ChangeDetected { changes: ChangeSet },
    /// A full rediscovery replaced the graph.
    GraphUpdated { units: usize },
}

impl BuildEvent {
    /// The unit this event is about, if any.
    pub fn unit(&self) -> Option<&str> {
        match self {
            Self::BuildStarted { unit, .. }
            | Self::BuildComplete { unit, .. }
            | Self::BuildError { unit, .. } => Some(unit),
            Self::ChangeDetected { .. } | Self::GraphUpdated { .. } => None,
        }
    }
}

impl std::fmt::Display for BuildEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuildStarted { unit, .. } => write!(f, "building {unit}"),
            Self::BuildComplete { unit, key } => write!(f, "built {unit} ({})", &key.to_hex()[..12]),
            Self::BuildError { unit, error } => write!(f, "{unit} failed: {error}"),
            Self::ChangeDetected { changes } => write!(f, "{changes}"),
            Self::GraphUpdated { units } => write!(f, "graph updated, {units} units"),
        }
    }
}
