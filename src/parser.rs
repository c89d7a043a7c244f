//! Splits raw file content into filtered, tagged log entries

use crate::filter::FilterState;
use crate::log_entry::LogEntry;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Maximum line length before truncation
const MAX_LINE_LENGTH: usize = 10_000;

/// Textual canonicalizations applied to the whole file content before line
/// splitting, in priority order. Verbose repeated level labels collapse into
/// the short tags the rest of the pipeline recognizes.
static REPLACEMENTS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"\bInformation:\s").unwrap(), " Inf "),
        (Regex::new(r"\bWarning:\s").unwrap(), " War "),
        (Regex::new(r"\bError:\s").unwrap(), " Err "),
        (Regex::new(r"\bDebug:\s").unwrap(), " Deb "),
        // Collapse the doubled "<-- event event -->" markers some services emit.
        (Regex::new(r"<-- event\s+event -->").unwrap(), "<-- event -->"),
    ]
});

/// Parse a file's full content into entries owned by `service`.
///
/// Replacements are applied before splitting; every surviving physical line
/// becomes one candidate entry. The filter runs here, at parse time, so
/// excluded lines never allocate an entry that the aggregator would only
/// throw away again.
pub fn parse_content(
    content: &str,
    service: &str,
    source_file: &Path,
    filter: &FilterState,
) -> Vec<LogEntry> {
    let mut canonical = content.to_string();
    for (pattern, replacement) in REPLACEMENTS.iter() {
        canonical = pattern.replace_all(&canonical, *replacement).into_owned();
    }

    canonical
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| truncate_line(line))
        .map(|line| LogEntry::new(line, service, source_file))
        .filter(|entry| filter.matches(entry))
        .collect()
}

fn truncate_line(line: &str) -> String {
    if line.len() <= MAX_LINE_LENGTH {
        return line.to_string();
    }
    // Truncate on a char boundary.
    let mut end = MAX_LINE_LENGTH;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated, {} bytes total]", &line[..end], line.len())
}
