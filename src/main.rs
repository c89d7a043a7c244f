//! logfold - aggregates timestamped service logs into one ordered,
//! foldable document
//!
//! Discovers `*.log` / `*.txt` files under a workspace root, merges their
//! entries into a single time-ordered document with per-second fold
//! regions, and keeps the result in sync with an interactive filter panel
//! through a typed message bus (serve mode) or with the files themselves
//! (watch mode).

mod aggregator;
mod backend;
mod config;
mod discovery;
mod file_groups;
mod file_watcher;
mod filter;
mod highlight;
mod log_entry;
mod log_reader;
mod message_bus;
mod parser;
mod protocol;
mod summary;
mod timestamp;

use crate::aggregator::Document;
use crate::backend::Backend;
use crate::config::AppConfig;
use crate::file_watcher::LogSetWatcher;
use crate::filter::{FilterEvent, FilterState};
use crate::log_entry::LogLevel;
use crate::message_bus::Endpoint;
use crate::protocol::{decode_envelope, encode_envelope};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "logfold", version, about = "Aggregate service logs into one foldable document")]
struct Cli {
    /// Workspace root to discover log files under
    root: PathBuf,

    /// Write the synthesized document here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,

    /// Lower time bound (inclusive), e.g. 2024-01-15T10:00:00
    #[arg(long)]
    from: Option<String>,

    /// Upper time bound (inclusive)
    #[arg(long)]
    till: Option<String>,

    /// Restrict output to these log levels (repeatable)
    #[arg(long)]
    level: Vec<String>,

    /// Keyword filters, OR'd together (repeatable, regex-capable)
    #[arg(long)]
    keyword: Vec<String>,

    /// Restrict output to the time window of this session id
    #[arg(long)]
    session_id: Option<String>,

    /// Summary metadata file to scrape session diagnostics from
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Drop entries without a parseable timestamp
    #[arg(long)]
    hide_untimed: bool,

    /// Substitute service tags with emoji
    #[arg(long)]
    emoji: bool,

    /// Speak the panel protocol as JSON lines on stdin/stdout
    #[arg(long)]
    serve: bool,

    /// Regenerate whenever a selected log file changes
    #[arg(long)]
    watch: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the document or, in serve mode,
    // the protocol stream.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut app_config = AppConfig::load().unwrap_or_else(|err| {
        tracing::warn!("failed to load configuration, using defaults: {err:#}");
        AppConfig::default()
    });
    if cli.emoji {
        app_config.display.emoji_service_tags = true;
    }

    let filter = seed_filter(&cli)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run(cli, app_config, filter))
}

/// Build the initial filter state from command-line arguments.
fn seed_filter(cli: &Cli) -> Result<FilterState> {
    let mut filter = FilterState::default();

    if let Some(from) = &cli.from {
        filter
            .apply(FilterEvent::SetFromDate(Some(from.clone())))
            .with_context(|| format!("invalid --from value {from:?}"))?;
    }
    if let Some(till) = &cli.till {
        filter
            .apply(FilterEvent::SetTillDate(Some(till.clone())))
            .with_context(|| format!("invalid --till value {till:?}"))?;
    }
    if !cli.level.is_empty() {
        for level in LogLevel::ALL {
            filter
                .apply(FilterEvent::RemoveLogLevel(level))
                .context("level reset")?;
        }
        for name in &cli.level {
            let Some(level) = LogLevel::from_marker(name) else {
                let valid: Vec<&str> = LogLevel::ALL.iter().map(|l| l.as_str()).collect();
                bail!("unknown log level {name:?} (expected one of: {})", valid.join(", "));
            };
            filter
                .apply(FilterEvent::AddLogLevel(level))
                .context("level add")?;
        }
    }
    for keyword in &cli.keyword {
        filter
            .apply(FilterEvent::AddKeywordFilter {
                keyword: keyword.clone(),
            })
            .context("keyword add")?;
    }
    if cli.hide_untimed {
        filter
            .apply(FilterEvent::SetRemoveNoEventTime(true))
            .context("hide-untimed")?;
    }

    Ok(filter)
}

async fn run(cli: Cli, app_config: AppConfig, filter: FilterState) -> Result<()> {
    let serve = cli.serve;
    let watch = cli.watch;
    let root = cli.root.clone();

    // In non-serve mode the panel peer stays alive so host notifications
    // drain harmlessly instead of erroring on a closed channel.
    let mut standalone_panel = None;

    let (endpoint, stdin_done) = if serve {
        let (endpoint, done) = stdio_endpoint();
        (endpoint, Some(done))
    } else {
        let (host, panel) = Endpoint::pair();
        standalone_panel = Some(panel);
        (host, None)
    };

    let sink = document_sink(cli.out.clone(), serve);
    let backend = Backend::new(
        root.clone(),
        cli.summary.clone(),
        filter,
        app_config,
        endpoint,
        sink,
    );
    backend.install_handlers();

    if let Some(session_id) = &cli.session_id {
        if !backend.set_session_filter(session_id) {
            bail!("session id {session_id:?} not found in any timestamped entry");
        }
    }

    backend.regenerate();

    if !serve && !watch {
        return Ok(());
    }

    let backend = Arc::new(backend);

    if watch {
        let watch_backend = backend.clone();
        let watch_root = root.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = watch_loop(&watch_backend, &watch_root) {
                tracing::error!("watch loop stopped: {err:#}");
            }
        });
    }

    match stdin_done {
        // Serve mode ends when stdin closes.
        Some(done) => {
            let _ = done.await;
        }
        // Watch-only mode runs until interrupted.
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;
        }
    }

    drop(standalone_panel);
    Ok(())
}

/// Bridge an endpoint to stdin/stdout JSON lines. Malformed inbound lines
/// are logged and dropped; the channel stays alive.
fn stdio_endpoint() -> (Endpoint, tokio::sync::oneshot::Receiver<()>) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let endpoint = Endpoint::new("host", outbound_tx, inbound_rx);

    tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(envelope) = outbound_rx.recv().await {
            match encode_envelope(&envelope) {
                Ok(line) => {
                    if writeln!(stdout, "{line}").and_then(|()| stdout.flush()).is_err() {
                        break;
                    }
                }
                Err(err) => tracing::error!("dropping unencodable envelope: {err}"),
            }
        }
    });

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match decode_envelope(&line) {
                Ok(envelope) => {
                    if inbound_tx.send(envelope).is_err() {
                        break;
                    }
                }
                Err(err) => tracing::error!("rejected inbound envelope: {err}"),
            }
        }
        let _ = done_tx.send(());
    });

    (endpoint, done_rx)
}

fn document_sink(out: Option<PathBuf>, serve: bool) -> backend::DocumentSink {
    Box::new(move |document: &Document| match &out {
        Some(path) => {
            if let Err(err) = std::fs::write(path, &document.text) {
                tracing::error!("failed to write document to {}: {err}", path.display());
            }
        }
        None if serve => {
            // Stdout carries the protocol stream; without --out the
            // document is only summarized.
            tracing::info!(
                entries = document.entries.len(),
                "document regenerated (pass --out to persist it)"
            );
        }
        None => {
            print!("{}", document.text);
        }
    })
}

/// Re-discover the selected file set and regenerate on every change event.
fn watch_loop(backend: &Backend, root: &std::path::Path) -> Result<()> {
    loop {
        let files = discovery::discover_log_files(root)?;
        let groups = file_groups::group_files(&files);
        let selected: Vec<PathBuf> = groups
            .iter()
            .flat_map(|group| group.files.iter().cloned())
            .collect();

        let watcher = LogSetWatcher::new(&selected)?;
        match watcher.wait_for_change() {
            Some(event) => {
                tracing::debug!(?event, "log set changed, regenerating");
                backend.regenerate();
            }
            None => return Ok(()),
        }
    }
}
