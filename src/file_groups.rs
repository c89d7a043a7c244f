//! Grouping discovered files by service and selecting the most recent ones

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// How many files are read per service on each regeneration
pub const MAX_LOG_FILES_PER_SERVICE: usize = 2;

/// Rotation timestamp embedded in log file names: `_YYYY-MM-DD_HH-mm-ss`
static FILENAME_TIMESTAMP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d{4}-\d{2}-\d{2})_(\d{2})-(\d{2})-(\d{2})").unwrap());

/// The files selected for one service, most recent first
#[derive(Debug, Clone)]
pub struct ServiceFileGroup {
    pub service: String,
    pub files: Vec<PathBuf>,
}

/// Service name: the filename substring before the first `_`, or the whole
/// stem when no underscore is present.
pub fn service_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match stem.split_once('_') {
        Some((prefix, _)) => prefix.to_string(),
        None => stem.to_string(),
    }
}

/// Rotation timestamp parsed from the path; files without one sort as epoch
/// (oldest, dropped first when a group exceeds the cap).
fn filename_timestamp(path: &Path) -> DateTime<Utc> {
    let text = path.to_string_lossy();
    let Some(caps) = FILENAME_TIMESTAMP_REGEX.captures(&text) else {
        return crate::timestamp::epoch();
    };
    let stamp = format!("{} {}:{}:{}", &caps[1], &caps[2], &caps[3], &caps[4]);
    NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| crate::timestamp::epoch())
}

/// Group a flat discovery list by service and truncate each group to its
/// [`MAX_LOG_FILES_PER_SERVICE`] most recent files.
///
/// Group order follows first appearance in the discovery list. Within a
/// group the sort is stable, so files with equal (or missing) rotation
/// timestamps keep their discovery order.
pub fn group_files(files: &[PathBuf]) -> Vec<ServiceFileGroup> {
    let mut groups: Vec<ServiceFileGroup> = Vec::new();

    for file in files {
        let service = service_name(file);
        match groups.iter_mut().find(|g| g.service == service) {
            Some(group) => group.files.push(file.clone()),
            None => groups.push(ServiceFileGroup {
                service,
                files: vec![file.clone()],
            }),
        }
    }

    for group in &mut groups {
        if group.files.len() > MAX_LOG_FILES_PER_SERVICE {
            group
                .files
                .sort_by_key(|file| std::cmp::Reverse(filename_timestamp(file)));
            group.files.truncate(MAX_LOG_FILES_PER_SERVICE);
        }
    }

    groups
}
