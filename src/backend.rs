//! Backend controller: applies protocol commands to the filter state and
//! regenerates the synthesized document
//!
//! One handler receives every command tag and dispatches through an
//! exhaustive match, so adding a command is a compile-checked change. The
//! filter state has a single writer (this controller); the aggregator only
//! ever reads a snapshot of it.

use crate::aggregator::{Aggregator, Document};
use crate::config::{AppConfig, DisplaySettings};
use crate::filter::{FilterEvent, FilterState};
use crate::highlight::HighlightStore;
use crate::log_entry::{LogEntry, LogLevel};
use crate::message_bus::{Endpoint, HandlerGuard, Responder};
use crate::protocol::{Command, Envelope};
use crate::{discovery, file_groups, parser, summary};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Receives every committed document (the host-editor seam).
pub type DocumentSink = Box<dyn Fn(&Document) + Send + Sync>;

pub struct Backend {
    inner: Arc<BackendInner>,
}

struct BackendInner {
    root: PathBuf,
    summary_path: Option<PathBuf>,
    filter: Mutex<FilterState>,
    display: Mutex<DisplaySettings>,
    highlights: Mutex<HighlightStore>,
    config: Mutex<AppConfig>,
    aggregator: Aggregator,
    endpoint: Endpoint,
    sink: DocumentSink,
    guards: Mutex<Vec<HandlerGuard>>,
}

impl Backend {
    pub fn new(
        root: PathBuf,
        summary_path: Option<PathBuf>,
        filter: FilterState,
        config: AppConfig,
        endpoint: Endpoint,
        sink: DocumentSink,
    ) -> Self {
        let display = config.display;
        let highlights = HighlightStore::from_config(&config.highlights);

        Self {
            inner: Arc::new(BackendInner {
                root,
                summary_path,
                filter: Mutex::new(filter),
                display: Mutex::new(display),
                highlights: Mutex::new(highlights),
                config: Mutex::new(config),
                aggregator: Aggregator::new(),
                endpoint,
                sink,
                guards: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register the command handler for every known tag.
    pub fn install_handlers(&self) {
        let mut guards = self.inner.guards.lock().unwrap();
        for tag in Command::TAGS {
            let inner = self.inner.clone();
            let guard = self.inner.endpoint.register_message_handler(
                tag,
                Arc::new(move |envelope, responder| {
                    inner.handle(envelope, responder);
                }),
            );
            guards.push(guard);
        }
    }

    /// Resolve a session id to its start time and apply the session filter.
    /// Returns false when the id never occurs with a timestamp.
    pub fn set_session_filter(&self, session_id: &str) -> bool {
        self.inner.apply_session_filter(session_id)
    }

    /// Run one regeneration pass and commit it unless superseded.
    pub fn regenerate(&self) {
        self.inner.regenerate();
    }
}

impl BackendInner {
    fn handle(&self, envelope: &Envelope, responder: &Responder) {
        match &envelope.command {
            Command::FilterLogLevel { level, enabled } => {
                match LogLevel::from_marker(level) {
                    Some(parsed) => {
                        let event = if *enabled {
                            FilterEvent::AddLogLevel(parsed)
                        } else {
                            FilterEvent::RemoveLogLevel(parsed)
                        };
                        self.apply_and_regenerate(event);
                    }
                    None => self.report_error(format!("unknown log level: {level:?}")),
                }
            }
            Command::FilterTime {
                from_date,
                till_date,
            } => {
                let mut changed = false;
                for event in [
                    FilterEvent::SetFromDate(from_date.clone()),
                    FilterEvent::SetTillDate(till_date.clone()),
                ] {
                    match self.filter.lock().unwrap().apply(event) {
                        Ok(()) => changed = true,
                        Err(err) => self.report_error(err.to_string()),
                    }
                }
                if changed {
                    self.regenerate();
                }
            }
            Command::FilterSessionId { session_id } => match session_id {
                Some(id) => {
                    if self.apply_session_filter(id) {
                        self.regenerate();
                    } else {
                        self.report_error(format!("session id {id:?} not found in any entry"));
                    }
                }
                None => self.apply_and_regenerate(FilterEvent::RemoveSessionFilter),
            },
            Command::FilterNoEventTime { enabled } => {
                self.apply_and_regenerate(FilterEvent::SetRemoveNoEventTime(*enabled));
            }
            Command::FilterCheckboxStateChange { keyword, checked } => {
                self.apply_and_regenerate(FilterEvent::KeywordCheckboxChanged {
                    keyword: keyword.clone(),
                    checked: *checked,
                });
            }
            Command::UpdateFileFilterCheckboxState { file_name, checked } => {
                self.apply_and_regenerate(FilterEvent::SetFileEnabled {
                    file_name: file_name.clone(),
                    enabled: *checked,
                });
            }
            Command::DisplaySettingsChanged { settings } => {
                *self.display.lock().unwrap() = *settings;
                self.persist_config();
                self.regenerate();
            }
            Command::GetSummary => {
                let summary = match &self.summary_path {
                    Some(path) => summary::scrape_summary_file(path),
                    None => summary::SummaryInfo::default(),
                };
                responder.respond(Command::GetSummaryResponse { summary });
            }
            Command::KeywordHighlightStateChange {
                id: _,
                keyword,
                color,
                is_checked,
            } => {
                {
                    let mut highlights = self.highlights.lock().unwrap();
                    let id = highlights.add(keyword.clone(), color.clone()).id.clone();
                    highlights.set_checked(&id, *is_checked);
                }
                self.persist_config();
            }
            Command::WebviewReady => {
                if let Err(err) = self.endpoint.acknowledge(envelope.id.clone()) {
                    tracing::warn!("failed to ack webviewReady: {err}");
                }
                self.regenerate();
            }
            // Host-editor collaborators: the backend only records the intent.
            Command::OpenFile { path } => {
                tracing::info!(path = %path, "open-file requested");
            }
            Command::JumpToRow { row } => {
                tracing::info!(row = *row, "jump-to-row requested");
            }
            Command::OpenSearchWindows { keyword } => {
                tracing::info!(?keyword, "search window requested");
            }
            Command::LogMessage { message } => {
                tracing::info!(target: "panel", "{message}");
            }
            Command::LogErrorMessage { message } => {
                tracing::error!(target: "panel", "{message}");
            }
            // Backend-originated notifications looping back; nothing to do.
            Command::MessageAck
            | Command::GetSummaryResponse { .. }
            | Command::ActiveFilterCountChanged { .. }
            | Command::FileStatisticsChanged { .. } => {}
        }
    }

    fn apply_and_regenerate(&self, event: FilterEvent) {
        let applied = self.filter.lock().unwrap().apply(event);
        match applied {
            Ok(()) => self.regenerate(),
            Err(err) => self.report_error(err.to_string()),
        }
    }

    fn apply_session_filter(&self, session_id: &str) -> bool {
        let Some(session_start) = self.lookup_session_start(session_id) else {
            return false;
        };
        let applied = self.filter.lock().unwrap().apply(FilterEvent::SetSessionFilter {
            session_id: session_id.to_string(),
            session_start,
        });
        match applied {
            Ok(()) => true,
            Err(err) => {
                self.report_error(err.to_string());
                false
            }
        }
    }

    /// First timestamped occurrence of the session id across the selected
    /// files, parsed without any filter so disabled dimensions cannot hide
    /// the session marker.
    fn lookup_session_start(&self, session_id: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        let files = match discovery::discover_log_files(&self.root) {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!("discovery failed during session lookup: {err:#}");
                return None;
            }
        };
        let groups = file_groups::group_files(&files);
        let unfiltered = FilterState::default();

        let mut entries: Vec<LogEntry> = Vec::new();
        for group in &groups {
            for file in &group.files {
                let Ok(content) = crate::log_reader::read_log_file(file) else {
                    continue;
                };
                entries.extend(parser::parse_content(&content, &group.service, file, &unfiltered));
            }
        }
        entries.sort_by_key(LogEntry::sort_key);

        summary::find_session_start(&entries, session_id)
    }

    fn regenerate(&self) {
        let version = self.aggregator.next_version();

        let files = match discovery::discover_log_files(&self.root) {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!("discovery failed, keeping previous document: {err:#}");
                return;
            }
        };
        let groups = file_groups::group_files(&files);
        let filter = self.filter.lock().unwrap().clone();
        let display = *self.display.lock().unwrap();

        let Some(document) = self.aggregator.generate(version, &groups, &filter, &display)
        else {
            return;
        };
        if !self.aggregator.is_current(version) {
            return;
        }

        (self.sink)(&document);

        let count = filter.active_filter_count();
        if let Err(err) = self
            .endpoint
            .send_and_forget(Command::ActiveFilterCountChanged { count })
        {
            tracing::debug!("active filter count not delivered: {err}");
        }
        if let Err(err) = self.endpoint.send_and_forget(Command::FileStatisticsChanged {
            statistics: document.file_statistics.clone(),
        }) {
            tracing::debug!("file statistics not delivered: {err}");
        }
    }

    fn persist_config(&self) {
        let mut config = self.config.lock().unwrap();
        config.display = *self.display.lock().unwrap();
        config.highlights = self.highlights.lock().unwrap().to_config();
        if let Err(err) = config.save() {
            tracing::warn!("failed to persist configuration: {err:#}");
        }
    }

    fn report_error(&self, message: String) {
        tracing::error!("{message}");
        if let Err(err) = self
            .endpoint
            .send_and_forget(Command::LogErrorMessage { message })
        {
            tracing::debug!("error report not delivered: {err}");
        }
    }
}
