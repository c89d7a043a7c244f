//! Merges parsed entries from every selected file into one foldable document
//!
//! Entries from all services merge into a single time-ordered sequence,
//! grouped into per-second fold regions the host editor can collapse.
//! Regeneration is versioned: a run whose version is superseded by a newer
//! trigger discards its result instead of committing it.

use crate::config::DisplaySettings;
use crate::file_groups::ServiceFileGroup;
use crate::filter::FilterState;
use crate::log_entry::LogEntry;
use crate::{log_reader, parser, timestamp};
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

/// Close marker emitted at the end of each per-second fold region
pub const FOLD_REGION_END: &str = "// Folding region end";

static GUID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

/// 16-hex-digit tokens surrounded by whitespace (correlation ids, pointers)
static HEX16_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<lead>^|\s)[0-9a-fA-F]{16}(?:\s|$)").unwrap());

/// Short level tags the parser canonicalized into the text
static LEVEL_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s(Inf|War|Err|Deb)\s").unwrap());

/// Entries contributed per selected file, for the panel's file checkboxes
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatistic {
    pub file_name: String,
    pub service: String,
    pub entry_count: usize,
}

/// One regeneration's committed output
#[derive(Debug, Clone)]
pub struct Document {
    /// The synthesized text handed to the host editor
    pub text: String,
    /// Surviving entries with final row numbers assigned
    pub entries: Vec<LogEntry>,
    /// Per-file entry counts
    pub file_statistics: Vec<FileStatistic>,
}

/// The aggregation pipeline plus its regeneration trigger counter.
///
/// Each regeneration captures the counter value returned by
/// [`Aggregator::next_version`]; [`Aggregator::generate`] drops its result
/// when a newer trigger was issued while it ran.
#[derive(Debug, Default)]
pub struct Aggregator {
    trigger: AtomicU64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump the change trigger and return the version for a new run.
    pub fn next_version(&self) -> u64 {
        self.trigger.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `version` is still the latest issued trigger.
    pub fn is_current(&self, version: u64) -> bool {
        self.trigger.load(Ordering::SeqCst) == version
    }

    /// Run one aggregation pass for `version`.
    ///
    /// Returns `None` when a newer trigger superseded this run; the caller
    /// must not commit anything in that case. Unreadable files are skipped
    /// with a warning and aggregation continues with whatever succeeded.
    pub fn generate(
        &self,
        version: u64,
        groups: &[ServiceFileGroup],
        filter: &FilterState,
        display: &DisplaySettings,
    ) -> Option<Document> {
        let mut pool: Vec<LogEntry> = Vec::new();
        let mut file_statistics = Vec::new();

        for group in groups {
            for file in &group.files {
                if !self.is_current(version) {
                    tracing::debug!(version, "regeneration superseded, dropping result");
                    return None;
                }

                let file_name = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();

                if !filter.is_file_enabled(&file_name) {
                    file_statistics.push(FileStatistic {
                        file_name,
                        service: group.service.clone(),
                        entry_count: 0,
                    });
                    continue;
                }

                let content = match log_reader::read_log_file(file) {
                    Ok(content) => content,
                    Err(err) => {
                        tracing::warn!("skipping unreadable log file: {err:#}");
                        continue;
                    }
                };

                let entries = parser::parse_content(&content, &group.service, file, filter);
                file_statistics.push(FileStatistic {
                    file_name,
                    service: group.service.clone(),
                    entry_count: entries.len(),
                });
                pool.extend(entries);
            }
        }

        // Stable: entries with equal timestamps keep parse order.
        pool.sort_by_key(LogEntry::sort_key);

        if !self.is_current(version) {
            tracing::debug!(version, "regeneration superseded, dropping result");
            return None;
        }

        Some(render_document(pool, display, file_statistics))
    }
}

fn render_document(
    pool: Vec<LogEntry>,
    display: &DisplaySettings,
    file_statistics: Vec<FileStatistic>,
) -> Document {
    let mut text = String::new();
    let mut entries = Vec::with_capacity(pool.len());
    let mut line_number = 0usize;
    let mut current_second: Option<DateTime<Utc>> = None;

    for mut entry in pool {
        let key = entry.sort_key();
        let second = key.with_nanosecond(0).unwrap_or(key);

        if current_second != Some(second) {
            if current_second.is_some() {
                text.push_str(FOLD_REGION_END);
                text.push('\n');
                text.push('\n');
                line_number += 2;
            }
            text.push_str("// ");
            text.push_str(&second.to_rfc3339_opts(SecondsFormat::Secs, true));
            text.push('\n');
            line_number += 1;
            current_second = Some(second);
        }

        text.push_str(&redact_line(&entry, display));
        text.push('\n');
        line_number += 1;
        entry.row_number = line_number;
        entries.push(entry);
    }

    if current_second.is_some() {
        text.push_str(FOLD_REGION_END);
        text.push('\n');
    }

    Document {
        text,
        entries,
        file_statistics,
    }
}

/// Redact an entry for display: strip matched timestamps, level tags,
/// filename suffixes, GUIDs and bare 16-hex tokens, then prefix the
/// service tag.
fn redact_line(entry: &LogEntry, display: &DisplaySettings) -> String {
    let mut line = timestamp::strip_timestamps(&entry.raw_text);
    line = GUID_REGEX.replace_all(&line, "").into_owned();
    line = HEX16_REGEX.replace_all(&line, "$lead").into_owned();
    line = LEVEL_TAG_REGEX.replace_all(&line, " ").into_owned();
    line = line.replace(".log", "").replace(".txt", "");

    format!("{} {}", service_tag(&entry.service, display), line.trim())
}

fn service_tag(service: &str, display: &DisplaySettings) -> String {
    if display.emoji_service_tags {
        emoji_for_service(service).to_string()
    } else {
        format!("[{service}]")
    }
}

/// Deterministic emoji assignment so a service keeps its tag across
/// regenerations.
fn emoji_for_service(service: &str) -> &'static str {
    const EMOJI: [&str; 8] = ["🟦", "🟩", "🟨", "🟪", "🟥", "🟧", "⬜", "🟫"];
    let sum: usize = service.bytes().map(usize::from).sum();
    EMOJI[sum % EMOJI.len()]
}
