//! Session/device metadata scraped from the optional summary file
//!
//! The summary file is loosely structured text; fields are pulled out by
//! fixed label patterns. A missing file yields an all-`None` summary, not
//! an error.

use crate::log_entry::LogEntry;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One signed-in user record from the summary file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub upn: Option<String>,
    pub name: Option<String>,
    pub tenant_id: Option<String>,
    pub oid: Option<String>,
    pub user_id: Option<String>,
}

/// Session diagnostics shown in the panel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryInfo {
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    pub host_version: Option<String>,
    pub web_version: Option<String>,
    pub language: Option<String>,
    pub ring: Option<String>,
    pub users: Vec<UserRecord>,
}

/// Scrape the summary file; absence yields the default (all-`None`) summary.
pub fn scrape_summary_file(path: &Path) -> SummaryInfo {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_summary_text(&text),
        Err(err) => {
            tracing::debug!("no summary file at {}: {err}", path.display());
            SummaryInfo::default()
        }
    }
}

/// Scrape summary fields from loosely structured text.
pub fn parse_summary_text(text: &str) -> SummaryInfo {
    SummaryInfo {
        session_id: scrape_field(text, "Session Id"),
        device_id: scrape_field(text, "Device Id"),
        host_version: scrape_field(text, "Host Version"),
        web_version: scrape_field(text, "Web Version"),
        language: scrape_field(text, "Language"),
        ring: scrape_field(text, "Ring"),
        users: scrape_users(text),
    }
}

fn scrape_field(text: &str, label: &str) -> Option<String> {
    let pattern = format!(r"(?mi)^\s*{}\s*:\s*(.+?)\s*$", regex::escape(label));
    let regex = Regex::new(&pattern).ok()?;
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// User records come as blocks, each starting at a `UPN:` line.
fn scrape_users(text: &str) -> Vec<UserRecord> {
    let mut starts: Vec<usize> = Vec::new();
    for (offset, line) in line_offsets(text) {
        if line.trim_start().to_lowercase().starts_with("upn") {
            starts.push(offset);
        }
    }

    let mut users = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let block = &text[start..end];
        users.push(UserRecord {
            upn: scrape_field(block, "UPN"),
            name: scrape_field(block, "Name"),
            tenant_id: scrape_field(block, "Tenant Id"),
            oid: scrape_field(block, "OID"),
            user_id: scrape_field(block, "User Id"),
        });
    }
    users
}

fn line_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_inclusive('\n').scan(0usize, |offset, line| {
        let start = *offset;
        *offset += line.len();
        Some((start, line))
    })
}

/// First timestamped occurrence of the session id in the aggregated
/// entries; this anchors the session-relative filter window.
pub fn find_session_start(entries: &[LogEntry], session_id: &str) -> Option<DateTime<Utc>> {
    entries
        .iter()
        .filter(|entry| entry.raw_text.contains(session_id))
        .find_map(|entry| entry.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SAMPLE: &str = "\
Session Id: sess-42
Device Id: dev-7
Host Version: 1.6.00.4472
Web Version: 49/24010100
Language: en-US
Ring: ring3

UPN: jane@example.com
Name: Jane Doe
Tenant Id: tenant-1
OID: oid-1
User Id: user-1

UPN: guest@example.com
Name: Guest
Tenant Id: tenant-2
OID: oid-2
User Id: user-2
";

    #[test]
    fn test_parse_summary_fields() {
        let summary = parse_summary_text(SAMPLE);
        assert_eq!(summary.session_id.as_deref(), Some("sess-42"));
        assert_eq!(summary.device_id.as_deref(), Some("dev-7"));
        assert_eq!(summary.host_version.as_deref(), Some("1.6.00.4472"));
        assert_eq!(summary.web_version.as_deref(), Some("49/24010100"));
        assert_eq!(summary.language.as_deref(), Some("en-US"));
        assert_eq!(summary.ring.as_deref(), Some("ring3"));
    }

    #[test]
    fn test_parse_user_records() {
        let summary = parse_summary_text(SAMPLE);
        assert_eq!(summary.users.len(), 2);
        assert_eq!(summary.users[0].upn.as_deref(), Some("jane@example.com"));
        assert_eq!(summary.users[0].tenant_id.as_deref(), Some("tenant-1"));
        assert_eq!(summary.users[1].name.as_deref(), Some("Guest"));
        assert_eq!(summary.users[1].user_id.as_deref(), Some("user-2"));
    }

    #[test]
    fn test_partial_summary() {
        let summary = parse_summary_text("Session Id: only-this\n");
        assert_eq!(summary.session_id.as_deref(), Some("only-this"));
        assert_eq!(summary.device_id, None);
        assert!(summary.users.is_empty());
    }

    #[test]
    fn test_missing_file_yields_default() {
        let summary = scrape_summary_file(&PathBuf::from("/nonexistent/summary.txt"));
        assert_eq!(summary, SummaryInfo::default());
    }

    #[test]
    fn test_find_session_start() {
        let entries = vec![
            LogEntry::new(
                "startup, no session yet".to_string(),
                "App",
                Path::new("App.log"),
            ),
            LogEntry::new(
                "session sess-42 referenced without timestamp".to_string(),
                "App",
                Path::new("App.log"),
            ),
            LogEntry::new(
                "2024-01-01T10:00:05.000Z Inf session sess-42 started".to_string(),
                "App",
                Path::new("App.log"),
            ),
        ];

        let start = find_session_start(&entries, "sess-42").unwrap();
        assert_eq!(
            start,
            chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 1, 1, 10, 0, 5).unwrap()
        );
        assert!(find_session_start(&entries, "other").is_none());
    }
}
