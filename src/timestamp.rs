//! Local arrival timestamps as written by the streaming client.
//!
//! A record carries either a human-readable ISO-8601 wall-clock string or an
//! explicit nanosecond epoch. Both resolve to signed nanoseconds since the
//! Unix epoch, UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Nanoseconds per second.
pub const NS_PER_SEC: i64 = 1_000_000_000;

/// Nanoseconds per millisecond.
pub const NS_PER_MS: i64 = 1_000_000;

/// Naive layouts the streaming client has been seen to emit (no offset marker).
const NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Local arrival timestamp exactly as extracted from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", content = "value", rename_all = "snake_case")]
pub enum RawTimestamp {
    /// `Received Timestamp: 2025-01-01T00:00:00.123456`
    Iso(String),
    /// `Received Timestamp (ns): 1735689600123456000`
    Nanos(u64),
}

impl RawTimestamp {
    /// Resolve to nanoseconds since the Unix epoch.
    ///
    /// The nanosecond form is used as-is. The ISO form accepts RFC 3339 with an
    /// offset (converted to UTC) or a naive wall-clock value, which the
    /// producer always writes in UTC.
    pub fn to_epoch_nanos(&self) -> Result<i64, TimestampParseError> {
        match self {
            Self::Nanos(ns) => i64::try_from(*ns).map_err(|_| TimestampParseError {
                raw: ns.to_string(),
                reason: "nanosecond epoch exceeds i64 range".to_string(),
            }),
            Self::Iso(text) => parse_iso_nanos(text),
        }
    }

    pub fn is_nanos(&self) -> bool {
        matches!(self, Self::Nanos(_))
    }
}

impl std::fmt::Display for RawTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Iso(text) => write!(f, "{}", text),
            Self::Nanos(ns) => write!(f, "{} ns", ns),
        }
    }
}

/// A stored timestamp that neither supported form could interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampParseError {
    pub raw: String,
    pub reason: String,
}

impl std::fmt::Display for TimestampParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unparseable timestamp {:?}: {}", self.raw, self.reason)
    }
}

impl std::error::Error for TimestampParseError {}

fn parse_iso_nanos(text: &str) -> Result<i64, TimestampParseError> {
    let trimmed = text.trim();
    let parse_error = |reason: String| TimestampParseError {
        raw: trimmed.to_string(),
        reason,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt
            .with_timezone(&Utc)
            .timestamp_nanos_opt()
            .ok_or_else(|| parse_error("out of range for nanosecond epoch".to_string()));
    }

    let mut last_err = None;
    for layout in NAIVE_LAYOUTS {
        match NaiveDateTime::parse_from_str(trimmed, layout) {
            Ok(naive) => {
                return naive
                    .and_utc()
                    .timestamp_nanos_opt()
                    .ok_or_else(|| parse_error("out of range for nanosecond epoch".to_string()));
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(parse_error(
        last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "empty timestamp".to_string()),
    ))
}

/// Floor a nanosecond epoch to whole seconds.
#[inline]
pub fn floor_secs(ns: i64) -> i64 {
    ns.div_euclid(NS_PER_SEC)
}

/// Render a nanosecond epoch as `YYYY-MM-DD HH:MM:SS.ffffff` UTC.
pub fn format_utc_micros(ns: i64) -> String {
    DateTime::<Utc>::from_timestamp(ns.div_euclid(NS_PER_SEC), ns.rem_euclid(NS_PER_SEC) as u32)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        .unwrap_or_else(|| format!("{} ns", ns))
}

/// Render a whole-second epoch as `YYYY-MM-DD HH:MM:SS` UTC.
pub fn format_utc_secs(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{} s", secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nanos_form_is_used_verbatim() {
        let ts = RawTimestamp::Nanos(5_000_000_000);
        assert_eq!(ts.to_epoch_nanos().unwrap(), 5_000_000_000);
    }

    #[test]
    fn test_naive_iso_is_utc() {
        let ts = RawTimestamp::Iso("1970-01-01T00:00:05.250000".to_string());
        assert_eq!(ts.to_epoch_nanos().unwrap(), 5_250_000_000);
    }

    #[test]
    fn test_iso_without_fraction() {
        let ts = RawTimestamp::Iso("1970-01-01T00:01:00".to_string());
        assert_eq!(ts.to_epoch_nanos().unwrap(), 60 * NS_PER_SEC);
    }

    #[test]
    fn test_iso_with_space_separator() {
        let ts = RawTimestamp::Iso("1970-01-01 00:00:01.5".to_string());
        assert_eq!(ts.to_epoch_nanos().unwrap(), 1_500_000_000);
    }

    #[test]
    fn test_iso_with_offset_converts_to_utc() {
        let ts = RawTimestamp::Iso("1970-01-01T01:00:00+01:00".to_string());
        assert_eq!(ts.to_epoch_nanos().unwrap(), 0);

        let ts = RawTimestamp::Iso("1970-01-01T00:00:02.000001Z".to_string());
        assert_eq!(ts.to_epoch_nanos().unwrap(), 2_000_001_000);
    }

    #[test]
    fn test_microsecond_precision_is_exact() {
        let ts = RawTimestamp::Iso("2025-03-14T15:09:26.535897".to_string());
        let ns = ts.to_epoch_nanos().unwrap();
        assert_eq!(ns % 1_000, 0);
        assert_eq!((ns / 1_000) % 1_000_000, 535_897);
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = RawTimestamp::Iso("yesterday-ish".to_string())
            .to_epoch_nanos()
            .unwrap_err();
        assert_eq!(err.raw, "yesterday-ish");
        assert!(err.to_string().contains("unparseable"));
    }

    #[test]
    fn test_nanos_overflowing_i64_is_parse_error() {
        assert!(RawTimestamp::Nanos(u64::MAX).to_epoch_nanos().is_err());
    }

    #[test]
    fn test_floor_secs() {
        assert_eq!(floor_secs(1_999_999_999), 1);
        assert_eq!(floor_secs(2_000_000_000), 2);
        assert_eq!(floor_secs(-1), -1);
    }

    #[test]
    fn test_format_utc() {
        assert_eq!(format_utc_micros(1_500_000), "1970-01-01 00:00:00.001500");
        assert_eq!(format_utc_secs(86_400), "1970-01-02 00:00:00");
    }
}
