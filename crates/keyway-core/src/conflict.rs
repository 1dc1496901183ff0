//! Overlap arithmetic for PIN conflicts.
//!
//! A conflict is two non-expired, non-conflict guest PINs with the same
//! code and overlapping validity windows. The store performs the range
//! query; this module owns the pure arithmetic.

use crate::pin::pow10;
use crate::types::Timestamp;

/// Default number of increment candidates tried by alternative search.
pub const DEFAULT_ALTERNATIVE_ATTEMPTS: usize = 10;

/// Half-open range overlap: `a.from < b.until && a.until > b.from`.
pub fn windows_overlap(
    a_from: Timestamp,
    a_until: Timestamp,
    b_from: Timestamp,
    b_until: Timestamp,
) -> bool {
    a_from < b_until && a_until > b_from
}

/// The shared sub-window of two overlapping ranges.
pub fn overlap_window(
    a_from: Timestamp,
    a_until: Timestamp,
    b_from: Timestamp,
    b_until: Timestamp,
) -> (Timestamp, Timestamp) {
    (a_from.max(b_from), a_until.min(b_until))
}

/// Increment the integer value of a code, wrapping within its length.
///
/// `increment_code("9999", 1)` is `"0000"`; the original length is always
/// preserved.
pub fn increment_code(code: &str, increment: u64) -> String {
    let len = code.len();
    let num: u64 = code.parse().unwrap_or(0);
    format!("{:0len$}", (num + increment) % pow10(len))
}

/// The ordered candidate codes tried when searching for an alternative.
pub fn alternative_candidates(code: &str, attempts: usize) -> Vec<String> {
    let attempts = if attempts == 0 {
        DEFAULT_ALTERNATIVE_ATTEMPTS
    } else {
        attempts
    };
    (1..=attempts as u64)
        .map(|i| increment_code(code, i))
        .collect()
}
