//! Event record types for resumable SSE streams
//!
//! An `EventRecord` is one payload unit placed into a stream. The store
//! stamps it with a sequence number and an event ID on first write; after
//! that the record is immutable and may be replayed any number of times.

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delivery mode of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Keep the connection open and block for future events
    #[default]
    Streaming,
    /// Return buffered events and end; the client reconnects later
    Polling,
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamMode::Streaming => write!(f, "streaming"),
            StreamMode::Polling => write!(f, "polling"),
        }
    }
}

impl std::str::FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "streaming" => Ok(StreamMode::Streaming),
            "polling" => Ok(StreamMode::Polling),
            other => Err(format!("unknown stream mode: {}", other)),
        }
    }
}

/// Options for creating a new stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub session_id: String,
    pub stream_id: String,
    pub mode: StreamMode,
}

impl StreamOptions {
    pub fn new(session_id: impl Into<String>, stream_id: impl Into<String>, mode: StreamMode) -> Self {
        Self {
            session_id: session_id.into(),
            stream_id: stream_id.into(),
            mode,
        }
    }

    /// Key identifying the stream these options describe
    pub fn key(&self) -> StreamKey {
        StreamKey::new(&self.session_id, &self.stream_id)
    }
}

/// Identity of a stream: the (session, stream) pair
///
/// Kept as a structured pair so that IDs containing separators can never
/// alias another session's stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub session_id: String,
    pub stream_id: String,
}

impl StreamKey {
    pub fn new(session_id: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            stream_id: stream_id.into(),
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.session_id, self.stream_id)
    }
}

/// One event placed into a stream
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventRecord {
    /// Externally visible resumption token, assigned by the store
    #[serde(rename = "eventId", default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Position within the owning stream, assigned by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,

    /// SSE `event:` field
    #[serde(rename = "eventType", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Message payload (usually a JSON-RPC message)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Advisory delay before the client should reconnect
    #[serde(
        rename = "reconnectionIntervalMs",
        default,
        skip_serializing_if = "Option::is_none",
        with = "duration_millis"
    )]
    pub reconnection_interval: Option<Duration>,
}

impl EventRecord {
    /// Create a record carrying the given payload
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    /// Create a record with no payload (e.g. a priming event)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the SSE event type
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Attach a reconnection-interval hint
    pub fn with_reconnection_interval(mut self, interval: Duration) -> Self {
        self.reconnection_interval = Some(interval);
        self
    }

    /// Attach an existing event ID, marking the record as already stamped
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Stamp the record with its stream position and ID
    pub(crate) fn stamped(mut self, event_id: String, sequence: u64) -> Self {
        self.event_id = Some(event_id);
        self.sequence = Some(sequence);
        self
    }

    /// Render as a `text/event-stream` frame
    ///
    /// Multi-line payloads become several `data:` lines. The frame always
    /// ends with a blank line.
    pub fn to_sse_frame(&self) -> String {
        let mut frame = String::new();

        if let Some(id) = self.sse_event_id() {
            let _ = writeln!(frame, "id: {}", id);
        }
        if let Some(interval) = self.reconnection_interval {
            let _ = writeln!(frame, "retry: {}", interval.as_millis());
        }
        if let Some(event_type) = self.sse_event_type() {
            let _ = writeln!(frame, "event: {}", event_type);
        }

        match self.sse_data() {
            Some(data) => {
                for line in data.split('\n') {
                    let _ = writeln!(frame, "data: {}", line);
                }
            }
            None => frame.push_str("data: \n"),
        }

        frame.push('\n');
        frame
    }

    /// Payload serialized as the SSE `data:` text
    pub fn data_string(&self) -> Option<String> {
        self.data.as_ref().map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Payload text with `\r\n` and `\r` line endings folded to `\n`
    pub fn sse_data(&self) -> Option<String> {
        self.data_string()
            .map(|data| data.replace("\r\n", "\n").replace('\r', "\n"))
    }

    /// Event type, if it fits on a single SSE line
    pub fn sse_event_type(&self) -> Option<&str> {
        self.event_type.as_deref().filter(|value| is_single_line(value))
    }

    /// Event ID, if it fits on a single SSE line
    pub fn sse_event_id(&self) -> Option<&str> {
        self.event_id.as_deref().filter(|value| is_single_line(value))
    }
}

/// True when `value` can be written as one SSE field (no CR or LF)
pub fn is_single_line(value: &str) -> bool {
    !value.contains(|c: char| c == '\r' || c == '\n')
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_u64(d.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_mode_parse() {
        assert_eq!("polling".parse::<StreamMode>().unwrap(), StreamMode::Polling);
        assert_eq!("Streaming".parse::<StreamMode>().unwrap(), StreamMode::Streaming);
        assert!("push".parse::<StreamMode>().is_err());
    }

    #[test]
    fn test_stream_key_does_not_alias_on_separator() {
        let a = StreamKey::new("a:b", "c");
        let b = StreamKey::new("a", "b:c");
        assert_ne!(a, b);
    }

    #[test]
    fn test_sse_frame_with_all_fields() {
        let record = EventRecord::new(json!({"jsonrpc": "2.0", "method": "ping"}))
            .with_event_type("message")
            .with_reconnection_interval(Duration::from_millis(1500))
            .stamped("7".to_string(), 3);

        let frame = record.to_sse_frame();
        assert_eq!(
            frame,
            "id: 7\nretry: 1500\nevent: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"ping\"}\n\n"
        );
    }

    #[test]
    fn test_sse_frame_splits_multiline_data() {
        let record = EventRecord::new(json!("line one\nline two"));
        assert_eq!(record.to_sse_frame(), "data: line one\ndata: line two\n\n");
    }

    #[test]
    fn test_sse_frame_without_payload() {
        let record = EventRecord::empty().stamped("1".to_string(), 1);
        assert_eq!(record.to_sse_frame(), "id: 1\ndata: \n\n");
    }

    #[test]
    fn test_sse_frame_folds_carriage_returns() {
        let record = EventRecord::new(json!("line\r\nnext\rlast"));
        assert_eq!(record.sse_data().as_deref(), Some("line\nnext\nlast"));
        assert_eq!(record.to_sse_frame(), "data: line\ndata: next\ndata: last\n\n");
    }

    #[test]
    fn test_sse_frame_drops_multiline_event_type() {
        let record = EventRecord::new(json!(1)).with_event_type("a\nb");
        assert_eq!(record.sse_event_type(), None);
        assert_eq!(record.to_sse_frame(), "data: 1\n\n");

        assert!(is_single_line("message"));
        assert!(!is_single_line("a\rb"));
    }

    #[test]
    fn test_record_json_uses_millis_for_interval() {
        let record = EventRecord::new(json!(1)).with_reconnection_interval(Duration::from_secs(2));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["reconnectionIntervalMs"], 2000);

        let back: EventRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.reconnection_interval, Some(Duration::from_secs(2)));
    }
}
