//! Timestamp utilities
//!
//! History rows store `processed_at` as Unix milliseconds, so every
//! timestamp that reaches the store is truncated to millisecond precision.

use chrono::{DateTime, TimeZone, Utc};

/// Get current UTC timestamp at millisecond precision
pub fn now() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

/// Drop sub-millisecond precision from a timestamp
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    from_unix_millis(ts.timestamp_millis())
}

/// Convert a UTC timestamp to Unix milliseconds
pub fn to_unix_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert Unix milliseconds to a UTC timestamp
///
/// Out-of-range values clamp to the Unix epoch.
pub fn from_unix_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}
