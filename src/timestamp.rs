//! Timestamp extraction from raw log lines
//!
//! Service logs embed timestamps in a handful of known textual formats.
//! Extraction tries a fixed list of patterns in priority order and converts
//! the first match to UTC. Lines without a recognizable timestamp yield
//! `None`; downstream sorting treats them as the Unix epoch.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// The instant unknown-timestamp entries sort as.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// A successful extraction: the parsed instant plus the byte span of the
/// matched substring, retained so the aggregator can strip it on display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampMatch {
    pub instant: DateTime<Utc>,
    pub start: usize,
    pub end: usize,
}

/// Known timestamp formats, highest priority first.
///
/// 1. ISO-8601 with explicit offset: `2024-01-15T10:30:45.123456+01:00`
/// 2. ISO-8601 UTC (web style): `2024-01-15T10:30:45.123Z`
/// 3. Naive date-time, `T` or space separated: `2024-01-15 10:30:45.123`
static OFFSET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,6})?[+-]\d{2}:\d{2}").unwrap()
});

static ZULU_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,6})?Z").unwrap()
});

static NAIVE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d{1,6})?").unwrap()
});

/// Extract the first recognizable timestamp from a line.
///
/// Pure and deterministic: identical input always yields identical output.
pub fn extract(line: &str) -> Option<TimestampMatch> {
    if let Some(m) = OFFSET_REGEX.find(line) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(m.as_str()) {
            return Some(TimestampMatch {
                instant: dt.with_timezone(&Utc),
                start: m.start(),
                end: m.end(),
            });
        }
    }

    if let Some(m) = ZULU_REGEX.find(line) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(m.as_str()) {
            return Some(TimestampMatch {
                instant: dt.with_timezone(&Utc),
                start: m.start(),
                end: m.end(),
            });
        }
    }

    if let Some(m) = NAIVE_REGEX.find(line) {
        if let Some(dt) = parse_naive(m.as_str()) {
            return Some(TimestampMatch {
                instant: dt.and_utc(),
                start: m.start(),
                end: m.end(),
            });
        }
    }

    None
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// Remove every matched timestamp substring from a line.
pub fn strip_timestamps(line: &str) -> String {
    let mut out = OFFSET_REGEX.replace_all(line, "").into_owned();
    out = ZULU_REGEX.replace_all(&out, "").into_owned();
    NAIVE_REGEX.replace_all(&out, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_extract_offset_format() {
        let m = extract("2024-01-15T10:30:45.123456+02:00 Inf starting up").unwrap();
        assert_eq!(
            m.instant,
            Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 45).unwrap()
                + chrono::Duration::microseconds(123_456)
        );
        assert_eq!(m.start, 0);
    }

    #[test]
    fn test_extract_zulu_format() {
        let m = extract("prefix 2024-01-15T10:30:45.123Z suffix").unwrap();
        assert_eq!(
            m.instant,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap()
                + chrono::Duration::milliseconds(123)
        );
        assert_eq!(&"prefix 2024-01-15T10:30:45.123Z suffix"[m.start..m.end],
            "2024-01-15T10:30:45.123Z");
    }

    #[test]
    fn test_extract_naive_format() {
        let m = extract("2024-01-15 10:30:45 something happened").unwrap();
        assert_eq!(m.instant, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap());
    }

    #[test]
    fn test_offset_wins_over_naive() {
        // The naive pattern would also match the date-time prefix of an
        // offset timestamp; the offset pattern must win.
        let m = extract("2024-01-15T10:30:45.000+03:00").unwrap();
        assert_eq!(m.instant, Utc.with_ymd_and_hms(2024, 1, 15, 7, 30, 45).unwrap());
    }

    #[test]
    fn test_no_timestamp_returns_none() {
        assert!(extract("no timestamp here").is_none());
        assert!(extract("").is_none());
        assert!(extract("12:34:56 time only is not enough").is_none());
    }

    #[test]
    fn test_extract_is_deterministic() {
        let line = "2024-01-15T10:30:45.123Z repeated";
        assert_eq!(extract(line), extract(line));
    }

    #[test]
    fn test_strip_timestamps() {
        let stripped = strip_timestamps("2024-01-15T10:30:45.123Z Inf ready");
        assert_eq!(stripped, " Inf ready");
        assert_eq!(strip_timestamps("plain line"), "plain line");
    }
}
