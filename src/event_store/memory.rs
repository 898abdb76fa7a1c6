//! In-memory event stream store
//!
//! Streams live in a sharded table keyed by (session, stream). Event IDs
//! come from a store-wide counter, so they are unique across every stream
//! for the lifetime of the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::index::EventIndex;
use super::reader::InMemoryStreamReader;
use super::sessions::SessionRegistry;
use super::stream_state::StreamState;
use super::writer::InMemoryStreamWriter;
use super::{EventStreamReader, EventStreamStore, EventStreamWriter};
use crate::types::{StreamKey, StreamOptions, StreamStoreError, StreamStoreResult};

/// State shared between the store and its writers
#[derive(Debug, Default)]
pub(crate) struct EventLedger {
    pub(crate) index: EventIndex,
    last_event_id: AtomicU64,
    stored: Mutex<Vec<StoredEvent>>,
}

/// Diagnostic record of one appended event, dropped with its session
#[derive(Debug)]
struct StoredEvent {
    stream: StreamKey,
    event_id: String,
    reconnection_interval: Option<Duration>,
}

impl EventLedger {
    pub(crate) fn generate_event_id(&self) -> String {
        (self.last_event_id.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    pub(crate) fn track_event(&self, stream: &StreamKey, event_id: &str, reconnection_interval: Option<Duration>) {
        self.stored.lock().push(StoredEvent {
            stream: stream.clone(),
            event_id: event_id.to_string(),
            reconnection_interval,
        });
    }

    pub(crate) fn untrack_event(&self, event_id: &str) {
        self.stored.lock().retain(|event| event.event_id != event_id);
    }

    fn forget_stream(&self, stream: &StreamKey) -> usize {
        let mut stored = self.stored.lock();
        let before = stored.len();
        stored.retain(|event| &event.stream != stream);
        before - stored.len()
    }
}

/// Process-local store of resumable event streams
#[derive(Debug, Default)]
pub struct InMemoryEventStreamStore {
    streams: DashMap<StreamKey, Arc<StreamState>>,
    sessions: SessionRegistry,
    ledger: Arc<EventLedger>,
}

impl InMemoryEventStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream and return the concrete writer
    pub fn create(&self, options: StreamOptions) -> StreamStoreResult<InMemoryStreamWriter> {
        let key = options.key();

        let state = match self.streams.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(StreamStoreError::duplicate(&key.session_id, &key.stream_id));
            }
            Entry::Vacant(vacant) => {
                let state = Arc::new(StreamState::new(key.clone(), options.mode));
                vacant.insert(state.clone());
                state
            }
        };

        self.sessions
            .record_stream_for_session(&key.session_id, &key.stream_id);
        info!(stream = %key, mode = %options.mode, "Created event stream");

        Ok(InMemoryStreamWriter::new(self.ledger.clone(), state))
    }

    /// Reader resolved from an event ID
    pub fn reader_after(&self, last_event_id: &str) -> Option<InMemoryStreamReader> {
        let entry = self.ledger.index.resolve(last_event_id)?;
        debug!(
            stream = %entry.stream.key(),
            sequence = entry.sequence,
            "Resolved resume point"
        );
        Some(InMemoryStreamReader::new(entry.stream, entry.sequence))
    }

    /// Reader from the start of an existing stream
    pub fn reader_from_start(&self, session_id: &str, stream_id: &str) -> Option<InMemoryStreamReader> {
        let key = StreamKey::new(session_id, stream_id);
        let state = self.streams.get(&key).map(|s| s.value().clone())?;
        Some(InMemoryStreamReader::new(state, 0))
    }

    /// Remove every stream of a session; returns the number removed
    pub fn delete_session(&self, session_id: &str) -> usize {
        let Some(stream_ids) = self.sessions.take_streams_for_session(session_id) else {
            debug!(session_id, "No streams to delete for session");
            return 0;
        };

        let mut removed = 0;
        for stream_id in stream_ids {
            let key = StreamKey::new(session_id, stream_id);
            if let Some((_, state)) = self.streams.remove(&key) {
                state.complete();
                let purged = self.ledger.index.purge(&state);
                self.ledger.forget_stream(&key);
                debug!(stream = %key, purged, "Deleted event stream");
                removed += 1;
            }
        }

        info!(session_id, streams = removed, "Deleted streams for session");
        removed
    }

    /// Event IDs minted for live sessions, in append order
    pub fn stored_event_ids(&self) -> Vec<String> {
        self.ledger
            .stored
            .lock()
            .iter()
            .map(|event| event.event_id.clone())
            .collect()
    }

    /// Reconnection hints of live sessions' events, in append order
    pub fn stored_reconnection_intervals(&self) -> Vec<Duration> {
        self.ledger
            .stored
            .lock()
            .iter()
            .filter_map(|event| event.reconnection_interval)
            .collect()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn indexed_event_count(&self) -> usize {
        self.ledger.index.len()
    }

    pub fn streams_for_session(&self, session_id: &str) -> Vec<String> {
        self.sessions.streams_for_session(session_id)
    }
}

#[async_trait]
impl EventStreamStore for InMemoryEventStreamStore {
    async fn create_stream(&self, options: StreamOptions) -> StreamStoreResult<Box<dyn EventStreamWriter>> {
        let writer = self.create(options)?;
        Ok(Box::new(writer) as Box<dyn EventStreamWriter>)
    }

    async fn get_stream_reader(&self, last_event_id: &str) -> StreamStoreResult<Option<Box<dyn EventStreamReader>>> {
        Ok(self
            .reader_after(last_event_id)
            .map(|reader| Box::new(reader) as Box<dyn EventStreamReader>))
    }

    async fn open_stream_reader(
        &self,
        session_id: &str,
        stream_id: &str,
    ) -> StreamStoreResult<Option<Box<dyn EventStreamReader>>> {
        Ok(self
            .reader_from_start(session_id, stream_id)
            .map(|reader| Box::new(reader) as Box<dyn EventStreamReader>))
    }

    async fn delete_streams_for_session(&self, session_id: &str) -> StreamStoreResult<()> {
        self.delete_session(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventRecord, StreamMode};
    use serde_json::json;

    #[test]
    fn test_duplicate_stream_leaves_original_intact() {
        let store = InMemoryEventStreamStore::new();
        let writer = store
            .create(StreamOptions::new("s1", "r1", StreamMode::Streaming))
            .unwrap();
        writer.write(EventRecord::new(json!(1))).unwrap();

        let err = store
            .create(StreamOptions::new("s1", "r1", StreamMode::Polling))
            .unwrap_err();
        assert!(matches!(err, StreamStoreError::DuplicateStream { .. }));
        assert_eq!(store.stream_count(), 1);
        assert!(store.reader_from_start("s1", "r1").is_some());
    }

    #[test]
    fn test_event_ids_unique_across_streams() {
        let store = InMemoryEventStreamStore::new();
        let a = store.create(StreamOptions::new("s1", "a", StreamMode::Streaming)).unwrap();
        let b = store.create(StreamOptions::new("s2", "a", StreamMode::Streaming)).unwrap();

        let e1 = a.write(EventRecord::new(json!(1))).unwrap();
        let e2 = b.write(EventRecord::new(json!(2))).unwrap();
        let e3 = a.write(EventRecord::new(json!(3))).unwrap();

        assert_eq!(e1.event_id.as_deref(), Some("1"));
        assert_eq!(e2.event_id.as_deref(), Some("2"));
        assert_eq!(e3.event_id.as_deref(), Some("3"));
        assert_eq!(e1.sequence, Some(1));
        assert_eq!(e2.sequence, Some(1));
        assert_eq!(e3.sequence, Some(2));
        assert_eq!(store.stored_event_ids(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_prestamped_record_passes_through() {
        let store = InMemoryEventStreamStore::new();
        let writer = store.create(StreamOptions::new("s1", "r1", StreamMode::Streaming)).unwrap();

        let record = EventRecord::new(json!("replayed")).with_event_id("external-9");
        let out = writer.write(record.clone()).unwrap();

        assert_eq!(out, record);
        assert_eq!(store.indexed_event_count(), 0);
        assert!(store.stored_event_ids().is_empty());
    }

    #[test]
    fn test_reconnection_intervals_tracked() {
        let store = InMemoryEventStreamStore::new();
        let writer = store.create(StreamOptions::new("s1", "r1", StreamMode::Polling)).unwrap();

        writer.write(EventRecord::new(json!(1))).unwrap();
        writer
            .write(EventRecord::new(json!(2)).with_reconnection_interval(Duration::from_secs(3)))
            .unwrap();

        assert_eq!(store.stored_reconnection_intervals(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn test_dropping_writer_completes_stream() {
        let store = InMemoryEventStreamStore::new();
        let writer = store.create(StreamOptions::new("s1", "r1", StreamMode::Streaming)).unwrap();
        let event = writer.write(EventRecord::new(json!(1))).unwrap();
        drop(writer);

        let entry = store.ledger.index.resolve(event.event_id.as_deref().unwrap()).unwrap();
        assert!(entry.stream.is_completed());
    }

    #[test]
    fn test_write_after_session_delete_is_rejected() {
        let store = InMemoryEventStreamStore::new();
        let writer = store.create(StreamOptions::new("s1", "r1", StreamMode::Streaming)).unwrap();
        writer.write(EventRecord::new(json!(1))).unwrap();

        assert_eq!(store.delete_session("s1"), 1);

        let err = writer.write(EventRecord::new(json!(2))).unwrap_err();
        assert!(matches!(err, StreamStoreError::StreamCompleted { .. }));
        assert_eq!(store.indexed_event_count(), 0);
        assert_eq!(store.stream_count(), 0);
    }

    #[test]
    fn test_delete_session_forgets_diagnostics() {
        let store = InMemoryEventStreamStore::new();
        let a = store.create(StreamOptions::new("s1", "r1", StreamMode::Polling)).unwrap();
        let b = store.create(StreamOptions::new("s2", "r1", StreamMode::Polling)).unwrap();

        a.write(EventRecord::new(json!(1)).with_reconnection_interval(Duration::from_secs(1)))
            .unwrap();
        let kept = b
            .write(EventRecord::new(json!(2)).with_reconnection_interval(Duration::from_secs(2)))
            .unwrap();

        store.delete_session("s1");
        assert_eq!(store.stored_event_ids(), vec![kept.event_id.unwrap()]);
        assert_eq!(store.stored_reconnection_intervals(), vec![Duration::from_secs(2)]);
    }

    #[test]
    fn test_delete_session_is_idempotent() {
        let store = InMemoryEventStreamStore::new();
        let _w = store.create(StreamOptions::new("s1", "r1", StreamMode::Streaming)).unwrap();

        assert_eq!(store.delete_session("s1"), 1);
        assert_eq!(store.delete_session("s1"), 0);
        assert_eq!(store.delete_session("never-existed"), 0);
    }

    #[test]
    fn test_stream_id_reusable_after_session_delete() {
        let store = InMemoryEventStreamStore::new();
        let _w = store.create(StreamOptions::new("s1", "r1", StreamMode::Streaming)).unwrap();
        store.delete_session("s1");

        assert!(store.create(StreamOptions::new("s1", "r1", StreamMode::Streaming)).is_ok());
    }
}
