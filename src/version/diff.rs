//! Differences between two effective-version maps.

use serde::{Deserialize, Serialize};

use super::EvMap;

/// Units whose effective version changed, appeared or disappeared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changed: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changed.len() + self.added.len() + self.removed.len()
    }

    /// Units that need a (re)build check: changed and added, in name order.
    pub fn affected(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .changed
            .iter()
            .chain(&self.added)
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} changed, {} added, {} removed",
            self.changed.len(),
            self.added.len(),
            self.removed.len()
        )
    }
}

/// Compare two EV maps by key set and value.
pub fn diff_ev_maps(old: &EvMap, new: &EvMap) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (name, ev) in new {
        match old.get(name) {
            None => changes.added.push(name.clone()),
            Some(previous) if previous != ev => changes.changed.push(name.clone()),
            Some(_) => {}
        }
    }
    changes.removed = old
        .keys()
        .filter(|name| !new.contains_key(*name))
        .cloned()
        .collect();

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::ContentHash;

    fn map(entries: &[(&str, u8)]) -> EvMap {
        entries
            .iter()
            .map(|(name, byte)| (name.to_string(), ContentHash::new([*byte; 32])))
            .collect()
    }

    #[test]
    fn identical_maps_have_no_changes() {
        let m = map(&[("a", 1), ("b", 2)]);
        let changes = diff_ev_maps(&m, &m);
        assert!(changes.is_empty());
        assert_eq!(changes.len(), 0);
    }

    #[test]
    fn detects_changed_added_removed() {
        let old = map(&[("a", 1), ("b", 2), ("gone", 3)]);
        let new = map(&[("a", 1), ("b", 9), ("fresh", 4)]);
        let changes = diff_ev_maps(&old, &new);
        assert_eq!(changes.changed, ["b"]);
        assert_eq!(changes.added, ["fresh"]);
        assert_eq!(changes.removed, ["gone"]);
        assert_eq!(changes.affected(), ["b", "fresh"]);
        assert_eq!(changes.to_string(), "1 changed, 1 added, 1 removed");
    }

    #[test]
    fn empty_old_map_marks_everything_added() {
        let new = map(&[("b", 1), ("a", 2)]);
        let changes = diff_ev_maps(&EvMap::new(), &new);
        assert_eq!(changes.added, ["a", "b"]);
        assert!(changes.changed.is_empty());
    }
}
