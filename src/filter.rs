//! Composite filter state and the event reducer that mutates it
//!
//! All filter mutation flows through [`FilterState::apply`]; the aggregator
//! only ever reads the state. Dimensions combine conjunctively, except
//! keyword filters which are OR'd among themselves.

use crate::log_entry::{LogEntry, LogLevel};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Lead time subtracted from the session start when deriving the
/// session-relative lower time bound, so setup lines just before the
/// session marker survive.
const SESSION_LEAD_SECONDS: i64 = 5;

/// Filter mutation errors
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("unparsable date string: {0:?}")]
    InvalidDate(String),
}

/// A keyword filter: regex-capable string plus enabled flag.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    pub keyword: String,
    pub enabled: bool,
    regex: Option<Regex>,
}

impl KeywordFilter {
    fn new(keyword: String, enabled: bool) -> Self {
        // Invalid regex syntax degrades to a literal case-insensitive match.
        let regex = Regex::new(&format!("(?i){keyword}"))
            .or_else(|_| Regex::new(&format!("(?i){}", regex::escape(&keyword))))
            .ok();
        Self {
            keyword,
            enabled,
            regex,
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.regex {
            Some(r) => r.is_match(text),
            None => text.to_lowercase().contains(&self.keyword.to_lowercase()),
        }
    }
}

/// Session-relative time window, derived from the session id's first
/// occurrence in the aggregated entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFilter {
    pub session_id: String,
    pub session_start: DateTime<Utc>,
}

impl SessionFilter {
    fn window_start(&self) -> DateTime<Utc> {
        self.session_start - Duration::seconds(SESSION_LEAD_SECONDS)
    }
}

/// Which mutation most recently claimed the lower time bound. The session
/// filter and the manual from-date are mutually exclusive for that bound;
/// most recently applied wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FromBoundSource {
    #[default]
    Unset,
    Manual,
    Session,
}

/// Events that mutate the filter state
#[derive(Debug, Clone)]
pub enum FilterEvent {
    AddKeywordFilter { keyword: String },
    RemoveKeywordFilter { keyword: String },
    KeywordCheckboxChanged { keyword: String, checked: bool },
    AddLogLevel(LogLevel),
    RemoveLogLevel(LogLevel),
    /// `None` clears the bound; unparsable strings are rejected as an error
    SetFromDate(Option<String>),
    SetTillDate(Option<String>),
    SetSessionFilter {
        session_id: String,
        session_start: DateTime<Utc>,
    },
    RemoveSessionFilter,
    SetRemoveNoEventTime(bool),
    SetFileEnabled { file_name: String, enabled: bool },
}

/// The composite filter snapshot
#[derive(Debug, Clone)]
pub struct FilterState {
    from_date: Option<DateTime<Utc>>,
    till_date: Option<DateTime<Utc>>,
    from_source: FromBoundSource,
    remove_entries_with_no_event_time: bool,
    enabled_levels: HashSet<LogLevel>,
    keyword_filters: Vec<KeywordFilter>,
    session_filter: Option<SessionFilter>,
    file_enabled: HashMap<String, bool>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            from_date: None,
            till_date: None,
            from_source: FromBoundSource::Unset,
            remove_entries_with_no_event_time: false,
            enabled_levels: LogLevel::ALL.into_iter().collect(),
            keyword_filters: Vec::new(),
            session_filter: None,
            file_enabled: HashMap::new(),
        }
    }
}

impl FilterState {
    /// Apply a single mutation event.
    ///
    /// Invalid input (an unparsable date string) leaves the state unchanged
    /// and is reported as an error value; the caller logs and continues.
    pub fn apply(&mut self, event: FilterEvent) -> Result<(), FilterError> {
        match event {
            FilterEvent::AddKeywordFilter { keyword } => {
                if !self.keyword_filters.iter().any(|k| k.keyword == keyword) {
                    self.keyword_filters.push(KeywordFilter::new(keyword, true));
                }
            }
            FilterEvent::RemoveKeywordFilter { keyword } => {
                self.keyword_filters.retain(|k| k.keyword != keyword);
            }
            FilterEvent::KeywordCheckboxChanged { keyword, checked } => {
                match self
                    .keyword_filters
                    .iter_mut()
                    .find(|k| k.keyword == keyword)
                {
                    Some(k) => k.enabled = checked,
                    None => self
                        .keyword_filters
                        .push(KeywordFilter::new(keyword, checked)),
                }
            }
            FilterEvent::AddLogLevel(level) => {
                self.enabled_levels.insert(level);
            }
            FilterEvent::RemoveLogLevel(level) => {
                self.enabled_levels.remove(&level);
            }
            FilterEvent::SetFromDate(value) => match value {
                Some(text) => {
                    let parsed =
                        parse_date_string(&text).ok_or(FilterError::InvalidDate(text))?;
                    self.from_date = Some(parsed);
                    self.from_source = FromBoundSource::Manual;
                }
                None => {
                    self.from_date = None;
                    self.from_source = if self.session_filter.is_some() {
                        FromBoundSource::Session
                    } else {
                        FromBoundSource::Unset
                    };
                }
            },
            FilterEvent::SetTillDate(value) => match value {
                Some(text) => {
                    let parsed =
                        parse_date_string(&text).ok_or(FilterError::InvalidDate(text))?;
                    self.till_date = Some(parsed);
                }
                None => self.till_date = None,
            },
            FilterEvent::SetSessionFilter {
                session_id,
                session_start,
            } => {
                self.session_filter = Some(SessionFilter {
                    session_id,
                    session_start,
                });
                self.from_source = FromBoundSource::Session;
            }
            FilterEvent::RemoveSessionFilter => {
                self.session_filter = None;
                self.from_source = if self.from_date.is_some() {
                    FromBoundSource::Manual
                } else {
                    FromBoundSource::Unset
                };
            }
            FilterEvent::SetRemoveNoEventTime(value) => {
                self.remove_entries_with_no_event_time = value;
            }
            FilterEvent::SetFileEnabled { file_name, enabled } => {
                self.file_enabled.insert(file_name, enabled);
            }
        }
        Ok(())
    }

    /// The effective lower time bound: the session window when the session
    /// filter was applied most recently, the manual from-date otherwise.
    pub fn effective_from(&self) -> Option<DateTime<Utc>> {
        match self.from_source {
            FromBoundSource::Session => {
                self.session_filter.as_ref().map(SessionFilter::window_start)
            }
            FromBoundSource::Manual => self.from_date,
            FromBoundSource::Unset => None,
        }
    }

    #[allow(dead_code)]
    pub fn till_date(&self) -> Option<DateTime<Utc>> {
        self.till_date
    }

    #[allow(dead_code)]
    pub fn session_filter(&self) -> Option<&SessionFilter> {
        self.session_filter.as_ref()
    }

    pub fn keyword_filters(&self) -> &[KeywordFilter] {
        &self.keyword_filters
    }

    pub fn is_level_enabled(&self, level: LogLevel) -> bool {
        self.enabled_levels.contains(&level)
    }

    /// Whether a file (by file name) is enabled; unknown files default on.
    pub fn is_file_enabled(&self, file_name: &str) -> bool {
        self.file_enabled.get(file_name).copied().unwrap_or(true)
    }

    /// Evaluate an entry against all active dimensions, short-circuiting in
    /// order: file-enabled, no-event-time, time bounds, level, keywords.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(name) = entry.source_file.file_name().and_then(|n| n.to_str()) {
            if !self.is_file_enabled(name) {
                return false;
            }
        }

        if self.remove_entries_with_no_event_time && entry.timestamp.is_none() {
            return false;
        }

        // Unknown timestamps compare as epoch, so a lower bound excludes them.
        if let Some(from) = self.effective_from() {
            if entry.sort_key() < from {
                return false;
            }
        }
        if let Some(till) = self.till_date {
            if entry.sort_key() > till {
                return false;
            }
        }

        if let Some(level) = entry.level {
            if !self.enabled_levels.contains(&level) {
                return false;
            }
        }

        let enabled_keywords: Vec<&KeywordFilter> =
            self.keyword_filters.iter().filter(|k| k.enabled).collect();
        if !enabled_keywords.is_empty()
            && !enabled_keywords.iter().any(|k| k.is_match(&entry.raw_text))
        {
            return false;
        }

        true
    }

    /// Number of dimensions currently more restrictive than allow-all.
    pub fn active_filter_count(&self) -> usize {
        let mut count = 0;
        if self.effective_from().is_some() {
            count += 1;
        }
        if self.till_date.is_some() {
            count += 1;
        }
        if self.remove_entries_with_no_event_time {
            count += 1;
        }
        if self.enabled_levels.len() < LogLevel::ALL.len() {
            count += 1;
        }
        if self.keyword_filters.iter().any(|k| k.enabled) {
            count += 1;
        }
        if self.file_enabled.values().any(|enabled| !enabled) {
            count += 1;
        }
        count
    }
}

/// Parse the date strings the panel sends. Accepts RFC 3339, naive
/// date-times with `T` or space separators, and bare dates (midnight).
pub fn parse_date_string(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::Path;

    fn entry(text: &str) -> LogEntry {
        LogEntry::new(text.to_string(), "Auth", Path::new("Auth_2024-01-01_10-00-00.log"))
    }

    #[test]
    fn test_default_allows_everything() {
        let filter = FilterState::default();
        assert!(filter.matches(&entry("2024-01-01T10:00:00.000Z Inf hello")));
        assert!(filter.matches(&entry("no timestamp at all")));
        assert_eq!(filter.active_filter_count(), 0);
    }

    #[test]
    fn test_level_filter() {
        let mut filter = FilterState::default();
        for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn] {
            filter.apply(FilterEvent::RemoveLogLevel(level)).unwrap();
        }
        assert!(!filter.matches(&entry("2024-01-01T10:00:00.000Z Inf hello")));
        assert!(filter.matches(&entry("2024-01-01T10:00:00.000Z Err broken")));
        assert_eq!(filter.active_filter_count(), 1);
    }

    #[test]
    fn test_keyword_disjunction() {
        let mut filter = FilterState::default();
        filter
            .apply(FilterEvent::AddKeywordFilter {
                keyword: "token".to_string(),
            })
            .unwrap();
        assert!(filter.matches(&entry("refreshing token now")));
        assert!(!filter.matches(&entry("unrelated line")));

        // Enabling a second keyword only widens the match set.
        filter
            .apply(FilterEvent::AddKeywordFilter {
                keyword: "unrelated".to_string(),
            })
            .unwrap();
        assert!(filter.matches(&entry("refreshing token now")));
        assert!(filter.matches(&entry("unrelated line")));

        // Disabling every keyword stops the dimension from restricting.
        filter
            .apply(FilterEvent::KeywordCheckboxChanged {
                keyword: "token".to_string(),
                checked: false,
            })
            .unwrap();
        filter
            .apply(FilterEvent::KeywordCheckboxChanged {
                keyword: "unrelated".to_string(),
                checked: false,
            })
            .unwrap();
        assert!(filter.matches(&entry("anything passes")));
    }

    #[test]
    fn test_keyword_regex() {
        let mut filter = FilterState::default();
        filter
            .apply(FilterEvent::AddKeywordFilter {
                keyword: r"request \d+ failed".to_string(),
            })
            .unwrap();
        assert!(filter.matches(&entry("request 42 failed")));
        assert!(!filter.matches(&entry("request failed")));
    }

    #[test]
    fn test_invalid_date_leaves_state_unchanged() {
        let mut filter = FilterState::default();
        let err = filter.apply(FilterEvent::SetFromDate(Some("not-a-date".to_string())));
        assert!(matches!(err, Err(FilterError::InvalidDate(_))));
        assert_eq!(filter.effective_from(), None);
        assert_eq!(filter.active_filter_count(), 0);
    }

    #[test]
    fn test_time_bounds() {
        let mut filter = FilterState::default();
        filter
            .apply(FilterEvent::SetFromDate(Some("2024-01-01T10:00:00".to_string())))
            .unwrap();
        filter
            .apply(FilterEvent::SetTillDate(Some("2024-01-01T11:00:00".to_string())))
            .unwrap();

        assert!(filter.matches(&entry("2024-01-01T10:30:00.000Z inside")));
        assert!(!filter.matches(&entry("2024-01-01T09:59:59.000Z before")));
        assert!(!filter.matches(&entry("2024-01-01T11:00:01.000Z after")));
        // Unknown timestamp sorts as epoch and fails the lower bound.
        assert!(!filter.matches(&entry("no timestamp")));
        assert_eq!(filter.active_filter_count(), 2);
    }

    #[test]
    fn test_no_event_time_filter() {
        let mut filter = FilterState::default();
        filter
            .apply(FilterEvent::SetRemoveNoEventTime(true))
            .unwrap();
        assert!(!filter.matches(&entry("no timestamp")));
        assert!(filter.matches(&entry("2024-01-01T10:00:00.000Z fine")));
    }

    #[test]
    fn test_file_enabled() {
        let mut filter = FilterState::default();
        filter
            .apply(FilterEvent::SetFileEnabled {
                file_name: "Auth_2024-01-01_10-00-00.log".to_string(),
                enabled: false,
            })
            .unwrap();
        assert!(!filter.matches(&entry("2024-01-01T10:00:00.000Z Inf hello")));
        assert_eq!(filter.active_filter_count(), 1);
    }

    #[test]
    fn test_session_filter_takes_from_bound() {
        let mut filter = FilterState::default();
        filter
            .apply(FilterEvent::SetFromDate(Some("2024-01-01T08:00:00".to_string())))
            .unwrap();

        let session_start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        filter
            .apply(FilterEvent::SetSessionFilter {
                session_id: "abc".to_string(),
                session_start,
            })
            .unwrap();

        // Session applied last: its window start wins over the manual bound.
        let from = filter.effective_from().unwrap();
        assert_eq!(from, session_start - Duration::seconds(SESSION_LEAD_SECONDS));

        // Re-applying the manual bound flips precedence back.
        filter
            .apply(FilterEvent::SetFromDate(Some("2024-01-01T08:00:00".to_string())))
            .unwrap();
        assert_eq!(
            filter.effective_from().unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
        );

        // Removing the session filter keeps the manual bound.
        filter.apply(FilterEvent::RemoveSessionFilter).unwrap();
        assert!(filter.effective_from().is_some());
    }

    #[test]
    fn test_parse_date_string_variants() {
        assert!(parse_date_string("2024-01-01T10:00:00Z").is_some());
        assert!(parse_date_string("2024-01-01T10:00:00").is_some());
        assert!(parse_date_string("2024-01-01 10:00:00.123").is_some());
        assert!(parse_date_string("2024-01-01").is_some());
        assert!(parse_date_string("tomorrow").is_none());
    }
}
