//! Race-safe publication of a fully written directory.
//!
//! Writers never touch a final directory directly. They fill a private temp
//! directory under `{root}/.tmp/`, write a sentinel file last, then rename
//! the whole directory into place. A directory is only considered complete
//! when its sentinel exists, so readers never observe partial output and any
//! number of processes may race on the same target.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Name of the per-root directory holding in-flight writes.
pub const TEMP_DIR: &str = ".tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum PromoteError {
    #[error("failed to move {} into place", .target.display())]
    Rename {
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove incomplete {}", .target.display())]
    RemoveStale {
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The target kept reappearing without a sentinel.
    #[error("{} is held by an incomplete write", .target.display())]
    Race { target: PathBuf },
}

/// How a promotion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// Our directory is now the target.
    Installed,
    /// Another writer completed the target first; ours was discarded.
    LostRace,
}

/// Create a fresh, uniquely named directory under `{root}/.tmp/`.
pub fn temp_dir(root: &Path) -> io::Result<PathBuf> {
    let parent = root.join(TEMP_DIR);
    fs::create_dir_all(&parent)?;

    loop {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = parent.join(format!("{}-{nanos:x}-{n}", std::process::id()));

        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Rename `tmp` to `target`.
///
/// `tmp` must already contain `sentinel`. On any outcome other than
/// [`Promotion::Installed`], `tmp` is removed.
pub fn promote(tmp: &Path, target: &Path, sentinel: &str) -> Result<Promotion, PromoteError> {
    promote_with(tmp, target, sentinel, |from, to| fs::rename(from, to))
}

fn promote_with(
    tmp: &Path,
    target: &Path,
    sentinel: &str,
    mut rename: impl FnMut(&Path, &Path) -> io::Result<()>,
) -> Result<Promotion, PromoteError> {
    for attempt in 0..2 {
        let err = match rename(tmp, target) {
            Ok(()) => return Ok(Promotion::Installed),
            Err(err) => err,
        };

        if target.join(sentinel).exists() {
            discard(tmp);
            return Ok(Promotion::LostRace);
        }
        if !target.exists() {
            // Another writer cleared the slot between our rename and this check.
            if attempt == 0 && tmp.exists() {
                crate::debug!("store"; "{} vanished, retrying", target.display());
                continue;
            }
            discard(tmp);
            return Err(PromoteError::Rename {
                target: target.to_path_buf(),
                source: err,
            });
        }
        if attempt == 0 {
            crate::debug!("store"; "removing incomplete {}", target.display());
            match fs::remove_dir_all(target) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    discard(tmp);
                    return Err(PromoteError::RemoveStale {
                        target: target.to_path_buf(),
                        source,
                    });
                }
            }
        }
    }

    discard(tmp);
    Err(PromoteError::Race {
        target: target.to_path_buf(),
    })
}

/// Best-effort removal of an abandoned temp directory.
pub fn discard(tmp: &Path) {
    if let Err(e) = fs::remove_dir_all(tmp)
        && e.kind() != io::ErrorKind::NotFound
    {
        crate::debug!("store"; "failed to discard {}: {}", tmp.display(), e);
    }
}

/// Remove temp directories older than `max_age`. Returns how many were removed.
pub fn clear_stale_temp(root: &Path, max_age: Duration) -> usize {
    let Ok(entries) = fs::read_dir(root.join(TEMP_DIR)) else {
        return 0;
    };

    let now = SystemTime::now();
    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age >= max_age)
        })
        .filter(|entry| fs::remove_dir_all(entry.path()).is_ok())
        .count()
}
