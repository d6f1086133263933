//! Dot-separated numeric version comparison.
//!
//! Versions reported by the component (`"2.0.22"`, `"1.6.1"`) are compared
//! component-wise against the minimum versions the bridge requires.

// ============================================================================
// Imports
// ============================================================================

use std::cmp::Ordering;

// ============================================================================
// Comparison
// ============================================================================

/// Compares two dot-separated numeric versions.
///
/// Returns `None` when either side contains a component that is not a
/// non-empty run of ASCII digits. Components are compared numerically left
/// to right; when one version is a strict prefix of the other the longer one
/// is greater.
///
/// # Example
///
/// ```
/// use std::cmp::Ordering;
/// use pki_bridge::version::compare_versions;
///
/// assert_eq!(compare_versions("1.2", "1.2.1"), Some(Ordering::Less));
/// assert_eq!(compare_versions("2.0", "1.3"), Some(Ordering::Greater));
/// assert_eq!(compare_versions("1.a", "1.0"), None);
/// ```
#[must_use]
pub fn compare_versions(v1: &str, v2: &str) -> Option<Ordering> {
    let left = parse_parts(v1)?;
    let right = parse_parts(v2)?;

    for (a, b) in left.iter().zip(right.iter()) {
        match compare_numeric(a, b) {
            Ordering::Equal => continue,
            order => return Some(order),
        }
    }

    Some(left.len().cmp(&right.len()))
}

/// Returns `true` if `installed` is at least `required`.
///
/// Non-comparable versions never satisfy a requirement.
#[inline]
#[must_use]
pub fn satisfies(installed: &str, required: &str) -> bool {
    matches!(
        compare_versions(installed, required),
        Some(Ordering::Greater | Ordering::Equal)
    )
}

/// Returns `true` if `installed` is known to be older than `required`.
///
/// Non-comparable versions are not reported as older.
#[inline]
#[must_use]
pub fn is_older(installed: &str, required: &str) -> bool {
    compare_versions(installed, required) == Some(Ordering::Less)
}

// ============================================================================
// Helpers
// ============================================================================

/// Splits a version into digit runs, rejecting anything else.
fn parse_parts(version: &str) -> Option<Vec<&str>> {
    version
        .split('.')
        .map(|part| {
            (!part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())).then_some(part)
        })
        .collect()
}

/// Compares two digit runs by value without overflowing.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

// ============================================================================
// Tests
// ============================================================================
