//! Time utilities for the ledger.

use chrono::{DateTime, Duration, Timelike, Utc};

/// Timing defaults shared by the engine and its callers.
pub mod constants {
    use super::Duration;

    /// Default bound on a single deposit or withdrawal (5 seconds).
    pub fn default_operation_timeout() -> Duration {
        Duration::seconds(5)
    }

    /// Default pool acquisition timeout (5 seconds).
    pub fn default_acquire_timeout() -> Duration {
        Duration::seconds(5)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
///
/// Truncated to microseconds so values survive a round trip through
/// PostgreSQL `TIMESTAMPTZ` unchanged.
pub fn now() -> Timestamp {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

/// Duration extensions for convenient conversion.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}
