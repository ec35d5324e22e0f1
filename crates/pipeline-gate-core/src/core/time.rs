// crates/pipeline-gate-core/src/core/time.rs
// ============================================================================
// Module: Pipeline Gate Time Model
// Description: Canonical RFC3339 timestamps for runs, gates, and evidence.
// Purpose: Provide deterministic, replayable time values across run records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Pipeline Gate embeds explicit RFC3339 timestamps in run records, gate
//! resolutions, and evidence artifacts. The core never reads wall-clock time
//! directly; hosts supply timestamps through the
//! [`Clock`](crate::interfaces::Clock) capability so that replay and seal
//! verification stay deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Timestamp parse and format errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum TimeError {
    /// Value failed to parse as RFC3339.
    #[error("invalid rfc3339 timestamp: {0}")]
    Parse(String),
    /// Value failed to format as RFC3339.
    #[error("timestamp format failure: {0}")]
    Format(String),
}

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp serialized as an RFC3339 string on the wire.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
/// - Ordering follows the underlying instant, not the string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Timestamp {
    /// Creates a timestamp from an [`OffsetDateTime`].
    #[must_use]
    pub const fn new(value: OffsetDateTime) -> Self {
        Self(value)
    }

    /// Parses an RFC3339 string into a timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Parse`] when the value is not valid RFC3339.
    pub fn from_rfc3339(raw: &str) -> Result<Self, TimeError> {
        OffsetDateTime::parse(raw, &Rfc3339)
            .map(Self)
            .map_err(|err| TimeError::Parse(err.to_string()))
    }

    /// Formats the timestamp as an RFC3339 string.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Format`] when formatting fails.
    pub fn to_rfc3339(&self) -> Result<String, TimeError> {
        self.0.format(&Rfc3339).map_err(|err| TimeError::Format(err.to_string()))
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn unix_millis(&self) -> i128 {
        self.0.unix_timestamp_nanos() / 1_000_000
    }

    /// Returns the whole milliseconds elapsed from `earlier` to `self`,
    /// saturating at zero when `earlier` is later.
    #[must_use]
    pub fn millis_since(&self, earlier: Self) -> u64 {
        let delta = self.unix_millis() - earlier.unix_millis();
        u64::try_from(delta).unwrap_or(0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.format(&Rfc3339) {
            Ok(formatted) => f.write_str(&formatted),
            Err(_) => Err(fmt::Error),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::*;

    #[test]
    fn rfc3339_round_trip() {
        let ts = Timestamp::from_rfc3339("2026-03-01T12:00:00Z").unwrap();
        assert_eq!(ts.to_rfc3339().unwrap(), "2026-03-01T12:00:00Z");
    }

    #[test]
    fn millis_since_saturates() {
        let earlier = Timestamp::from_rfc3339("2026-03-01T12:00:00Z").unwrap();
        let later = Timestamp::from_rfc3339("2026-03-01T12:00:01.5Z").unwrap();
        assert_eq!(later.millis_since(earlier), 1_500);
        assert_eq!(earlier.millis_since(later), 0);
    }

    #[test]
    fn serializes_as_plain_string() {
        let ts = Timestamp::from_rfc3339("2026-03-01T12:00:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2026-03-01T12:00:00Z\"");
    }
}
