//! File watching for regeneration triggers
//!
//! Watch mode regenerates the synthesized document whenever one of the
//! selected log files changes. The watcher observes the parent directories
//! of the selected set (so log rotation recreating a file is still seen)
//! and forwards coarse change events over a channel the regeneration loop
//! drains.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Events sent from the log set watcher
#[derive(Debug, Clone)]
pub enum LogWatchEvent {
    /// A selected log file changed (written, created, or rotated)
    Changed(PathBuf),
    /// Error occurred while watching
    Error(String),
}

/// Watches the selected log files for modification
pub struct LogSetWatcher {
    _watcher: RecommendedWatcher,
    event_rx: Receiver<LogWatchEvent>,
}

impl LogSetWatcher {
    /// Create a watcher over the given selected files.
    pub fn new(files: &[PathBuf]) -> Result<Self> {
        let (tx, rx) = bounded::<LogWatchEvent>(100);

        let watched: HashSet<PathBuf> = files.iter().cloned().collect();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }
                    for path in &event.paths {
                        if watched.contains(path) {
                            let _ = tx.try_send(LogWatchEvent::Changed(path.clone()));
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.try_send(LogWatchEvent::Error(e.to_string()));
                }
            },
            Config::default().with_poll_interval(Duration::from_millis(100)),
        )
        .context("Failed to create file watcher")?;

        // Watch each parent directory once to also catch rotation.
        let mut parents: HashSet<PathBuf> = HashSet::new();
        for file in files {
            let parent = file
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            parents.insert(parent);
        }
        for parent in &parents {
            watcher
                .watch(parent, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch directory {}", parent.display()))?;
        }

        Ok(Self {
            _watcher: watcher,
            event_rx: rx,
        })
    }

    /// Get the event receiver
    #[allow(dead_code)]
    pub fn events(&self) -> &Receiver<LogWatchEvent> {
        &self.event_rx
    }

    /// Block until a change arrives, then drain whatever else is queued so
    /// a burst of writes triggers a single regeneration.
    pub fn wait_for_change(&self) -> Option<LogWatchEvent> {
        let first = self.event_rx.recv().ok()?;
        while self.event_rx.try_recv().is_ok() {}
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_watcher_reports_modification() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("App_2024-01-01_10-00-00.log");
        fs::write(&path, "initial\n").unwrap();

        let watcher = LogSetWatcher::new(std::slice::from_ref(&path)).unwrap();

        fs::write(&path, "initial\nmore\n").unwrap();

        let event = watcher
            .events()
            .recv_timeout(Duration::from_secs(5))
            .expect("expected a change event");
        match event {
            LogWatchEvent::Changed(changed) => assert_eq!(changed, path),
            LogWatchEvent::Error(e) => panic!("watcher error: {e}"),
        }
    }

    #[test]
    fn test_watcher_ignores_unselected_files() {
        let dir = TempDir::new().unwrap();
        let selected = dir.path().join("App.log");
        let other = dir.path().join("Other.log");
        fs::write(&selected, "a\n").unwrap();
        fs::write(&other, "b\n").unwrap();

        let watcher = LogSetWatcher::new(std::slice::from_ref(&selected)).unwrap();

        fs::write(&other, "b\nc\n").unwrap();

        assert!(watcher
            .events()
            .recv_timeout(Duration::from_millis(500))
            .is_err());
    }
}
