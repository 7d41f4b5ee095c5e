//! Time types for SLUICE.
//!
//! Rounds are evaluated at an explicit `now` supplied by the caller, so
//! planning never reads the wall clock itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp in whole seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create from seconds since the Unix epoch
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Current wall clock time
    #[must_use]
    pub fn now() -> Self {
        Self(u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0))
    }

    /// Seconds since the Unix epoch
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    #[must_use]
    pub const fn since(&self, earlier: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }

    /// Add a duration
    #[must_use]
    pub const fn add(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.0))
    }

    /// RFC 3339 rendering for operator output
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        i64::try_from(self.0)
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A span of whole seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Duration(u64);

impl Duration {
    /// Create from seconds
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Create from hours
    #[must_use]
    pub const fn from_hours(hours: u64) -> Self {
        Self(hours * 60 * 60)
    }

    /// Length in seconds
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Check if zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(d: Duration) -> Self {
        std::time::Duration::from_secs(d.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_saturates() {
        let early = Timestamp::from_secs(100);
        let late = Timestamp::from_secs(250);
        assert_eq!(late.since(early), Duration::from_secs(150));
        assert_eq!(early.since(late), Duration::from_secs(0));
    }

    #[test]
    fn test_hours() {
        assert_eq!(Duration::from_hours(72).as_secs(), 259_200);
    }

    #[test]
    fn test_add() {
        let t = Timestamp::from_secs(10).add(Duration::from_secs(5));
        assert_eq!(t.as_secs(), 15);
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(Timestamp::from_secs(0).to_rfc3339(), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_now_is_after_epoch() {
        assert!(Timestamp::now().as_secs() > 1_600_000_000);
    }
}
