//! Version conflict resolution for external dependencies.
//!
//! Not a semver solver: when two units ask for the same package, the more
//! specific or higher request wins and the environment is installed once.

use std::cmp::Ordering;

/// Version strings that name a workspace member rather than a registry package.
const PSEUDO_PREFIXES: &[&str] = &["workspace:", "link:", "file:"];

pub fn is_pseudo_reference(version: &str) -> bool {
    let version = version.trim();
    PSEUDO_PREFIXES.iter().any(|p| version.starts_with(p))
}

/// `*`, `x`, `latest` and the empty string accept anything.
pub fn is_wildcard(version: &str) -> bool {
    matches!(version.trim(), "" | "*" | "x" | "X" | "latest")
}

/// Whether `candidate` should replace `current`.
///
/// Concrete versions beat wildcards; otherwise the higher version wins.
/// Ties keep `current`.
pub fn prefers(candidate: &str, current: &str) -> bool {
    match (is_wildcard(candidate), is_wildcard(current)) {
        (true, _) => false,
        (false, true) => true,
        (false, false) => compare_versions(candidate, current) == Ordering::Greater,
    }
}

/// Compare the numeric dotted components of two version requests after
/// stripping range operators. Missing components count as zero.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = components(a);
    let b = components(b);
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// `"^1.2.3-beta"` → `[1, 2, 3]`; `">=2 <3"` → `[2]`.
fn components(version: &str) -> Vec<u64> {
    let version = version
        .trim()
        .trim_start_matches(|c: char| matches!(c, '^' | '~' | '>' | '<' | '=' | 'v' | ' '));
    let first = version.split_whitespace().next().unwrap_or("");
    let core = first.split(['-', '+']).next().unwrap_or("");

    core.split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}
