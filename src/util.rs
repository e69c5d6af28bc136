//! Shared utility functions for the inferex crate.

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Format a byte count with binary (1024-based) units and one decimal place.
///
/// Picks the largest unit that keeps the value at or above 1, so `1536`
/// renders as `"1.5 KB"` and `0` as `"0.0 B"`.
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
