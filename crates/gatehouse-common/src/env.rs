//! Environment variable helpers
//!
//! Boolean flags accept `1`, `true` or `yes` (case-insensitive, surrounding
//! whitespace ignored). Anything else, including an unset variable, is false.

use std::time::Duration;

/// Parse a flag value using the accepted truthy spellings
pub fn parse_flag(value: &str) -> bool {
    let v = value.trim();
    v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
}

/// Read a boolean flag from the environment
pub fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| parse_flag(&v)).unwrap_or(false)
}

/// Read a duration expressed in whole seconds, falling back to `default`
/// when the variable is unset or not a number
pub fn env_duration_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
