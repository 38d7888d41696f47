//! Time-related utilities with clock abstraction for testability.

use chrono::{DateTime, Local, NaiveDateTime};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Get the current local time
    fn now(&self) -> DateTime<Local>;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: DateTime<Local>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    pub fn new(fixed_time: DateTime<Local>) -> Self {
        Self { fixed_time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.fixed_time
    }
}

/// Parse a server timestamp.
///
/// The chat server serialises timestamps as ISO-8601 local date-times
/// without an offset, with or without fractional seconds
/// (`2024-05-01T09:30:00` or `2024-05-01T09:30:00.123456`).
pub fn parse_server_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Render a server timestamp as `YYYY-MM-DD HH:MM:SS` for display.
///
/// Values that cannot be parsed are returned unchanged.
pub fn format_server_timestamp(value: &str) -> String {
    match parse_server_timestamp(value) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => value.to_string(),
    }
}

/// Render the clock's current time as `HH:MM:SS`.
pub fn format_clock_time(clock: &dyn Clock) -> String {
    clock.now().format("%H:%M:%S").to_string()
}
