//! Wall-clock abstraction and wire timestamp formatting.
//!
//! Every envelope carries a machine-generated `timestamp` field. Units take a
//! [`ClockSource`] so tests can pin the clock instead of sleeping and then
//! asserting on formatted strings.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};

/// Abstraction over the system clock for dependency injection.
///
/// Allows deterministic testing by replacing the real clock with a fixed one.
/// The default implementation ([`SystemClock`]) delegates to
/// `std::time::SystemTime`.
pub trait ClockSource: Send + Sync {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before Unix epoch")
            .as_millis() as u64
    }
}

/// Formats milliseconds-since-epoch as the wire timestamp string
/// `YYYY-MM-DDTHH:MM:SS` (UTC, second precision).
///
/// Sub-second precision is deliberately dropped: the timestamp is a
/// human-readable generation marker, not a correlation key.
#[must_use]
pub fn format_wire_timestamp(millis: u64) -> String {
    let secs = i64::try_from(millis / 1000).unwrap_or(0);
    Utc.timestamp_opt(secs, 0)
        .single()
        .map_or_else(|| "1970-01-01T00:00:00".to_string(), |dt| {
            dt.format("%Y-%m-%dT%H:%M:%S").to_string()
        })
}
