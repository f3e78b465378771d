//! Build keys.

use serde::{Deserialize, Serialize};

use crate::version::{ContentHash, Hasher};

/// Flags that change build output and therefore take part in the key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildFlags {
    pub sourcemap: bool,
}

/// Address of one build in the store: hash of (unit name, EV, flags).
///
/// Recomputed whenever needed; never stored as mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildKey(ContentHash);

impl BuildKey {
    pub fn compute(name: &str, ev: &ContentHash, flags: BuildFlags) -> Self {
        let mut hasher = Hasher::new("build-key");
        hasher.str(name).hash(ev);
        hasher.field(&[u8::from(flags.sourcemap)]);
        Self(hasher.finish())
    }

    /// Parse a store directory name.
    pub fn from_hex(s: &str) -> Option<Self> {
        ContentHash::from_hex(s).map(Self)
    }

    pub fn to_hex(self) -> String {
        self.0.to_hex()
    }
}

impl std::fmt::Display for BuildKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(byte: u8) -> ContentHash {
        ContentHash::new([byte; 32])
    }

    #[test]
    fn deterministic() {
        let flags = BuildFlags::default();
        assert_eq!(
            BuildKey::compute("chat", &ev(1), flags),
            BuildKey::compute("chat", &ev(1), flags)
        );
    }

    #[test]
    fn every_input_matters() {
        let base = BuildKey::compute("chat", &ev(1), BuildFlags::default());
        assert_ne!(base, BuildKey::compute("chats", &ev(1), BuildFlags::default()));
        assert_ne!(base, BuildKey::compute("chat", &ev(2), BuildFlags::default()));
        assert_ne!(
            base,
            BuildKey::compute("chat", &ev(1), BuildFlags { sourcemap: true })
        );
    }

    #[test]
    fn hex_round_trip() {
        let key = BuildKey::compute("chat", &ev(1), BuildFlags::default());
        let hex = key.to_string();
        assert_eq!(hex.len(), 64);
        assert_eq!(BuildKey::from_hex(&hex), Some(key));
        assert_eq!(BuildKey::from_hex("not-a-key"), None);
    }
}
