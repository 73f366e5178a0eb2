//! Time types for buildlens.
//!
//! Build events carry wall-clock timestamps in two shapes (RFC 3339 strings
//! and epoch milliseconds) and durations as protobuf-JSON strings such as
//! `"1.500s"`. Everything is normalized to milliseconds here.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

/// Wall clock timestamp in milliseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from epoch milliseconds
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Create from a protobuf `Timestamp` (seconds + nanos)
    #[must_use]
    pub const fn from_proto(seconds: i64, nanos: i32) -> Self {
        Self(seconds.saturating_mul(1_000).saturating_add(nanos as i64 / 1_000_000))
    }

    /// Parse an RFC 3339 timestamp such as `2024-03-01T10:00:00.250Z`
    ///
    /// # Errors
    ///
    /// Returns error if the text is not RFC 3339
    pub fn parse_rfc3339(text: &str) -> CoreResult<Self> {
        DateTime::parse_from_rfc3339(text.trim())
            .map(|dt| Self(dt.timestamp_millis()))
            .map_err(|e| CoreError::InvalidTimestamp {
                reason: format!("{}: {}", text, e),
            })
    }

    /// Epoch milliseconds
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, clamped at zero
    #[must_use]
    pub const fn millis_since(&self, earlier: &Timestamp) -> u64 {
        let delta = self.0.saturating_sub(earlier.0);
        if delta < 0 { 0 } else { delta as u64 }
    }

    /// Add a millisecond offset
    #[must_use]
    pub const fn add_millis(&self, millis: u64) -> Self {
        let millis = if millis > i64::MAX as u64 { i64::MAX } else { millis as i64 };
        Self(self.0.saturating_add(millis))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match DateTime::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Parse a duration into milliseconds.
///
/// Accepts protobuf-JSON durations (`"1.5s"`, `"0.000250s"`), explicit
/// millisecond strings (`"250ms"`) and bare integers, which are taken as
/// milliseconds.
///
/// # Errors
///
/// Returns error for negative or unparseable durations
pub fn parse_duration_ms(text: &str) -> CoreResult<u64> {
    let text = text.trim();
    let invalid = |reason: &str| CoreError::InvalidDuration {
        reason: format!("'{}': {}", text, reason),
    };

    if text.starts_with('-') {
        return Err(invalid("negative duration"));
    }

    if let Some(ms) = text.strip_suffix("ms") {
        return ms.parse::<u64>().map_err(|_| invalid("bad millisecond count"));
    }

    if let Some(secs) = text.strip_suffix('s') {
        let (whole, frac) = secs.split_once('.').unwrap_or((secs, ""));
        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("bad seconds"))?
        };
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("bad fraction"));
        }
        // Only the first three fractional digits contribute to millis.
        let mut frac_ms = 0u64;
        for (i, c) in frac.chars().take(3).enumerate() {
            let digit = u64::from(c as u8 - b'0');
            frac_ms += digit * 10u64.pow(2 - i as u32);
        }
        return Ok(whole.saturating_mul(1_000).saturating_add(frac_ms));
    }

    text.parse::<u64>().map_err(|_| invalid("unrecognized format"))
}

/// Human-readable duration: `850ms`, `12.4s`, `3m 05s`, `1h 02m 09s`
#[must_use]
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1_000 {
        return format!("{}ms", ms);
    }
    let total_secs = ms / 1_000;
    if total_secs < 60 {
        return format!("{}.{}s", total_secs, (ms % 1_000) / 100);
    }
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    if hours == 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_timestamp_rfc3339() {
        let ts = Timestamp::parse_rfc3339("1970-01-01T00:00:01.250Z").unwrap();
        assert_eq!(ts.as_millis(), 1_250);

        let ts = Timestamp::parse_rfc3339("2024-03-01T10:00:00+01:00").unwrap();
        assert_eq!(ts.as_millis(), 1_709_283_600_000);

        assert!(Timestamp::parse_rfc3339("yesterday").is_err());
    }

    #[test]
    fn test_timestamp_from_proto() {
        let ts = Timestamp::from_proto(12, 345_000_000);
        assert_eq!(ts.as_millis(), 12_345);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let start = Timestamp::from_millis(1_000);
        let end = start.add_millis(600);
        assert_eq!(end.as_millis(), 1_600);
        assert_eq!(end.millis_since(&start), 600);
        assert_eq!(start.millis_since(&end), 0);
    }

    #[test]
    fn test_timestamp_display() {
        assert_eq!(Timestamp::from_millis(1_500).to_string(), "1970-01-01T00:00:01.500Z");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_ms("1.5s").unwrap(), 1_500);
        assert_eq!(parse_duration_ms("0.000250s").unwrap(), 0);
        assert_eq!(parse_duration_ms("2.345678s").unwrap(), 2_345);
        assert_eq!(parse_duration_ms("3s").unwrap(), 3_000);
        assert_eq!(parse_duration_ms(".5s").unwrap(), 500);
        assert_eq!(parse_duration_ms("250ms").unwrap(), 250);
        assert_eq!(parse_duration_ms("42").unwrap(), 42);
        assert!(parse_duration_ms("-1s").is_err());
        assert!(parse_duration_ms("soon").is_err());
        assert!(parse_duration_ms("1.xs").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_ms(850), "850ms");
        assert_eq!(format_duration_ms(12_400), "12.4s");
        assert_eq!(format_duration_ms(185_000), "3m 05s");
        assert_eq!(format_duration_ms(3_729_000), "1h 02m 09s");
    }

    proptest! {
        #[test]
        fn prop_whole_seconds_parse(secs in 0u64..1_000_000) {
            prop_assert_eq!(parse_duration_ms(&format!("{}s", secs)).unwrap(), secs * 1_000);
        }

        #[test]
        fn prop_millis_since_never_negative(a in any::<i32>(), b in any::<i32>()) {
            let a = Timestamp::from_millis(i64::from(a));
            let b = Timestamp::from_millis(i64::from(b));
            let forward = a.millis_since(&b);
            let backward = b.millis_since(&a);
            prop_assert!(forward == 0 || backward == 0);
        }
    }
}
