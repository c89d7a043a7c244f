//! Typed command envelopes exchanged between the panel and the backend
//!
//! Envelope structure: `{ "id": <correlation id>, "command": <tag>,
//! "data": <payload> }`. The command set is closed: every tag carries
//! exactly one payload shape, enforced by typed deserialization, so a
//! malformed envelope is a recoverable error value and never crashes the
//! channel.

use crate::aggregator::FileStatistic;
use crate::config::DisplaySettings;
use crate::summary::SummaryInfo;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unknown command tag: {0:?}")]
    UnknownCommand(String),

    #[error("payload for {tag:?} does not match its schema: {detail}")]
    SchemaMismatch { tag: String, detail: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("timed out waiting for {0:?}")]
    Timeout(String),

    #[error("channel closed")]
    ChannelClosed,
}

/// The closed command set. One payload shape per tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "camelCase")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    FilterLogLevel { level: String, enabled: bool },
    #[serde(rename_all = "camelCase")]
    FilterTime {
        from_date: Option<String>,
        till_date: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    FilterSessionId { session_id: Option<String> },
    FilterNoEventTime { enabled: bool },
    #[serde(rename_all = "camelCase")]
    FilterCheckboxStateChange { keyword: String, checked: bool },
    #[serde(rename_all = "camelCase")]
    UpdateFileFilterCheckboxState { file_name: String, checked: bool },
    DisplaySettingsChanged { settings: DisplaySettings },
    GetSummary,
    GetSummaryResponse { summary: SummaryInfo },
    #[serde(rename_all = "camelCase")]
    KeywordHighlightStateChange {
        id: String,
        keyword: String,
        color: String,
        is_checked: bool,
    },
    OpenFile { path: String },
    JumpToRow { row: usize },
    OpenSearchWindows { keyword: Option<String> },
    WebviewReady,
    MessageAck,
    LogMessage { message: String },
    LogErrorMessage { message: String },
    ActiveFilterCountChanged { count: usize },
    FileStatisticsChanged { statistics: Vec<FileStatistic> },
}

impl Command {
    /// Every known command tag, used to tell an unknown tag apart from a
    /// known tag with a bad payload.
    pub const TAGS: [&'static str; 19] = [
        "filterLogLevel",
        "filterTime",
        "filterSessionId",
        "filterNoEventTime",
        "filterCheckboxStateChange",
        "updateFileFilterCheckboxState",
        "displaySettingsChanged",
        "getSummary",
        "getSummaryResponse",
        "keywordHighlightStateChange",
        "openFile",
        "jumpToRow",
        "openSearchWindows",
        "webviewReady",
        "messageAck",
        "logMessage",
        "logErrorMessage",
        "activeFilterCountChanged",
        "fileStatisticsChanged",
    ];

    /// The wire tag of this command
    pub fn tag(&self) -> &'static str {
        match self {
            Command::FilterLogLevel { .. } => "filterLogLevel",
            Command::FilterTime { .. } => "filterTime",
            Command::FilterSessionId { .. } => "filterSessionId",
            Command::FilterNoEventTime { .. } => "filterNoEventTime",
            Command::FilterCheckboxStateChange { .. } => "filterCheckboxStateChange",
            Command::UpdateFileFilterCheckboxState { .. } => "updateFileFilterCheckboxState",
            Command::DisplaySettingsChanged { .. } => "displaySettingsChanged",
            Command::GetSummary => "getSummary",
            Command::GetSummaryResponse { .. } => "getSummaryResponse",
            Command::KeywordHighlightStateChange { .. } => "keywordHighlightStateChange",
            Command::OpenFile { .. } => "openFile",
            Command::JumpToRow { .. } => "jumpToRow",
            Command::OpenSearchWindows { .. } => "openSearchWindows",
            Command::WebviewReady => "webviewReady",
            Command::MessageAck => "messageAck",
            Command::LogMessage { .. } => "logMessage",
            Command::LogErrorMessage { .. } => "logErrorMessage",
            Command::ActiveFilterCountChanged { .. } => "activeFilterCountChanged",
            Command::FileStatisticsChanged { .. } => "fileStatisticsChanged",
        }
    }
}

/// A command plus its correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(flatten)]
    pub command: Command,
}

impl Envelope {
    /// Wrap a command with a fresh correlation id
    pub fn new(command: Command) -> Self {
        Self {
            id: next_correlation_id(),
            command,
        }
    }

    /// Wrap a command correlated to an existing id (responses, acks)
    pub fn with_id(id: impl Into<String>, command: Command) -> Self {
        Self {
            id: id.into(),
            command,
        }
    }
}

/// Generate a unique correlation id
pub fn next_correlation_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("mid-{n}")
}

/// Serialize an envelope to its wire form
pub fn encode_envelope(envelope: &Envelope) -> Result<String, ProtocolError> {
    serde_json::to_string(envelope).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Validate and decode an inbound envelope.
///
/// Shape is checked before payload: a missing `id` or `command` field is a
/// malformed envelope; a known tag with a payload that fails its schema is
/// a schema mismatch whose message names the tag and the offending fields.
pub fn decode_envelope(json: &str) -> Result<Envelope, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| ProtocolError::MalformedEnvelope("envelope is not an object".into()))?;

    if !object.get("id").is_some_and(serde_json::Value::is_string) {
        return Err(ProtocolError::MalformedEnvelope(
            "missing or non-string \"id\" field".into(),
        ));
    }

    let tag = object
        .get("command")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| {
            ProtocolError::MalformedEnvelope("missing or non-string \"command\" field".into())
        })?
        .to_string();

    if !Command::TAGS.contains(&tag.as_str()) {
        return Err(ProtocolError::UnknownCommand(tag));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::SchemaMismatch {
        tag,
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope::new(Command::FilterLogLevel {
            level: "error".to_string(),
            enabled: true,
        });
        let json = encode_envelope(&envelope).unwrap();
        let decoded = decode_envelope(&json).unwrap();

        assert_eq!(decoded, envelope);
        assert_eq!(decoded.command.tag(), "filterLogLevel");
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let envelope = Envelope::with_id(
            "mid-7",
            Command::UpdateFileFilterCheckboxState {
                file_name: "Auth.log".to_string(),
                checked: false,
            },
        );
        let json = encode_envelope(&envelope).unwrap();

        assert!(json.contains("\"command\":\"updateFileFilterCheckboxState\""));
        assert!(json.contains("\"fileName\":\"Auth.log\""));
        assert!(json.contains("\"id\":\"mid-7\""));
    }

    #[test]
    fn test_zero_payload_commands() {
        let json = encode_envelope(&Envelope::with_id("mid-1", Command::GetSummary)).unwrap();
        let decoded = decode_envelope(&json).unwrap();
        assert_eq!(decoded.command, Command::GetSummary);
    }

    #[test]
    fn test_missing_command_is_malformed() {
        let err = decode_envelope(r#"{"id":"mid-1","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_missing_id_is_malformed() {
        let err = decode_envelope(r#"{"command":"getSummary"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = decode_envelope(r#"{"id":"mid-1","command":"selfDestruct"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(tag) if tag == "selfDestruct"));
    }

    #[test]
    fn test_schema_mismatch_names_tag() {
        let err = decode_envelope(
            r#"{"id":"mid-1","command":"jumpToRow","data":{"row":"not-a-number"}}"#,
        )
        .unwrap_err();
        match err {
            ProtocolError::SchemaMismatch { tag, detail } => {
                assert_eq!(tag, "jumpToRow");
                assert!(!detail.is_empty());
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = next_correlation_id();
        let b = next_correlation_id();
        assert_ne!(a, b);
    }
}
