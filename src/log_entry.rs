//! Log entry data structures

use crate::timestamp::{self, TimestampMatch};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Log severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// All levels, in ascending severity order.
    pub const ALL: [LogLevel; 4] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    /// Parse log level from a textual marker
    pub fn from_marker(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DEBUG" | "DEB" | "DBG" => Some(LogLevel::Debug),
            "INFO" | "INF" => Some(LogLevel::Info),
            "WARN" | "WARNING" | "WAR" => Some(LogLevel::Warn),
            "ERROR" | "ERR" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Get display name
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// A single log entry tagged with its owning service
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Event time in UTC; `None` when no timestamp pattern matched
    pub timestamp: Option<DateTime<Utc>>,
    /// Byte span of the matched timestamp within `raw_text`
    #[allow(dead_code)]
    pub timestamp_span: Option<(usize, usize)>,
    /// Original line content (pre-redaction)
    pub raw_text: String,
    /// Owning service, derived from the filename prefix
    pub service: String,
    /// Path of origin, retained for jump-to-line and open-file
    pub source_file: PathBuf,
    /// 1-based line number within the synthesized output; 0 until assigned
    #[allow(dead_code)]
    pub row_number: usize,
    /// Detected severity
    pub level: Option<LogLevel>,
}

impl LogEntry {
    /// Create a new entry from a raw line
    pub fn new(raw_text: String, service: &str, source_file: &Path) -> Self {
        let level = Self::detect_level(&raw_text);
        let ts = timestamp::extract(&raw_text);

        Self {
            timestamp: ts.map(|m| m.instant),
            timestamp_span: ts.map(|m: TimestampMatch| (m.start, m.end)),
            raw_text,
            service: service.to_string(),
            source_file: source_file.to_path_buf(),
            row_number: 0,
            level,
        }
    }

    /// Sort key for the global merge: unknown timestamps order as epoch.
    pub fn sort_key(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(timestamp::epoch)
    }

    /// Detect log level from content
    fn detect_level(content: &str) -> Option<LogLevel> {
        static LEVEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?i)\b(DEBUG|DEB|DBG|INFO|INF|WARN|WARNING|WAR|ERROR|ERR)\b").unwrap()
        });

        LEVEL_REGEX
            .find(content)
            .and_then(|m| LogLevel::from_marker(m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_level_detection() {
        let entry = LogEntry::new(
            "2024-01-15T10:30:45.000Z Inf service ready".to_string(),
            "Auth",
            Path::new("Auth_2024-01-15_10-00-00.log"),
        );
        assert_eq!(entry.level, Some(LogLevel::Info));

        let entry = LogEntry::new(
            "something failed: Err token expired".to_string(),
            "Auth",
            Path::new("Auth.log"),
        );
        assert_eq!(entry.level, Some(LogLevel::Error));
    }

    #[test]
    fn test_level_from_marker() {
        assert_eq!(LogLevel::from_marker("Inf"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_marker("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_marker("DBG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_marker("nope"), None);
    }

    #[test]
    fn test_timestamp_attached() {
        let entry = LogEntry::new(
            "2024-01-15T10:30:45.000Z Inf ready".to_string(),
            "Chat",
            Path::new("Chat.log"),
        );
        assert_eq!(
            entry.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap())
        );
        assert_eq!(entry.timestamp_span, Some((0, 24)));
    }

    #[test]
    fn test_sort_key_unknown_is_epoch() {
        let entry = LogEntry::new("no time".to_string(), "Chat", Path::new("Chat.log"));
        assert_eq!(entry.timestamp, None);
        assert_eq!(entry.sort_key(), crate::timestamp::epoch());
    }
}
