//! Stream State - append-only log for one (session, stream) pair
//!
//! The log and its completion flag live behind a single `parking_lot`
//! mutex. Blocked readers are woken through a `watch` channel whose value
//! is bumped on every append and on completion. Readers subscribe while
//! holding the same lock that appends take, so a reader that snapshotted
//! the log can never miss the next append.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::types::{EventRecord, StreamKey, StreamMode, StreamStoreError, StreamStoreResult};

/// Append-only event log for a single stream
pub struct StreamState {
    key: StreamKey,
    mode: RwLock<StreamMode>,
    /// Last sequence number handed out by `next_sequence`
    sequence: AtomicU64,
    log: Mutex<StreamLog>,
    signal: watch::Sender<u64>,
}

struct StreamLog {
    /// Events in ascending sequence order
    events: Vec<(u64, EventRecord)>,
    completed: bool,
}

/// Consistent view of a stream returned by [`StreamState::events_after`]
pub struct EventsAfter {
    /// Events with a sequence strictly greater than the requested one
    pub events: Vec<EventRecord>,
    /// Highest sequence returned, or the requested sequence if none
    pub last_sequence: u64,
    /// Whether the stream was completed when the snapshot was taken
    pub completed: bool,
    /// Resolves on the next append or on completion
    pub signal: NewEventSignal,
}

/// Wait handle for the next change to a stream
pub struct NewEventSignal {
    rx: watch::Receiver<u64>,
}

impl NewEventSignal {
    /// Wait until an event is appended or the stream completes
    ///
    /// Dropping the future before it resolves leaves nothing registered
    /// on the stream.
    pub async fn notified(mut self) {
        // An error means the stream itself was dropped, which also ends the wait
        let _ = self.rx.changed().await;
    }

    /// Whether the stream changed since this handle was created
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(true)
    }
}

impl StreamState {
    pub fn new(key: StreamKey, mode: StreamMode) -> Self {
        let (signal, _) = watch::channel(0);
        Self {
            key,
            mode: RwLock::new(mode),
            sequence: AtomicU64::new(0),
            log: Mutex::new(StreamLog {
                events: Vec::new(),
                completed: false,
            }),
            signal,
        }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn session_id(&self) -> &str {
        &self.key.session_id
    }

    pub fn stream_id(&self) -> &str {
        &self.key.stream_id
    }

    pub fn mode(&self) -> StreamMode {
        *self.mode.read()
    }

    pub fn set_mode(&self, mode: StreamMode) {
        *self.mode.write() = mode;
    }

    pub fn is_completed(&self) -> bool {
        self.log.lock().completed
    }

    /// Number of events currently buffered
    pub fn len(&self) -> usize {
        self.log.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next sequence number for this stream (starts at 1, never reused)
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Append a stamped record and wake blocked readers
    pub fn append(&self, record: EventRecord, sequence: u64) -> StreamStoreResult<()> {
        let mut log = self.log.lock();
        if log.completed {
            return Err(StreamStoreError::completed(self.session_id(), self.stream_id()));
        }

        log.events.push((sequence, record));
        self.signal.send_modify(|version| *version += 1);
        Ok(())
    }

    /// Snapshot every event after `sequence`
    pub fn events_after(&self, sequence: u64) -> EventsAfter {
        let log = self.log.lock();

        let start = log.events.partition_point(|(seq, _)| *seq <= sequence);
        let tail = &log.events[start..];
        let last_sequence = tail.last().map_or(sequence, |(seq, _)| *seq);

        EventsAfter {
            events: tail.iter().map(|(_, record)| record.clone()).collect(),
            last_sequence,
            completed: log.completed,
            signal: NewEventSignal {
                rx: self.signal.subscribe(),
            },
        }
    }

    /// Mark the stream completed and wake every blocked reader
    ///
    /// Returns `true` if this call completed the stream.
    pub fn complete(&self) -> bool {
        let mut log = self.log.lock();
        if log.completed {
            return false;
        }
        log.completed = true;
        self.signal.send_modify(|version| *version += 1);
        true
    }

    /// IDs of every buffered event, in sequence order
    pub fn event_ids(&self) -> Vec<String> {
        self.log
            .lock()
            .events
            .iter()
            .filter_map(|(_, record)| record.event_id.clone())
            .collect()
    }
}

impl std::fmt::Debug for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamState")
            .field("key", &self.key)
            .field("mode", &self.mode())
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn state(mode: StreamMode) -> StreamState {
        StreamState::new(StreamKey::new("s1", "r1"), mode)
    }

    fn push(state: &StreamState, value: i64) -> u64 {
        let seq = state.next_sequence();
        let record = EventRecord::new(json!(value)).stamped(seq.to_string(), seq);
        state.append(record, seq).unwrap();
        seq
    }

    #[test]
    fn test_sequence_starts_at_one_and_survives_mode_change() {
        let state = state(StreamMode::Streaming);
        assert_eq!(state.next_sequence(), 1);
        state.set_mode(StreamMode::Polling);
        assert_eq!(state.next_sequence(), 2);
        state.set_mode(StreamMode::Streaming);
        assert_eq!(state.next_sequence(), 3);
    }

    #[test]
    fn test_events_after_returns_tail() {
        let state = state(StreamMode::Streaming);
        for i in 1..=5 {
            push(&state, i);
        }

        let batch = state.events_after(3);
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0].sequence, Some(4));
        assert_eq!(batch.events[1].sequence, Some(5));
        assert_eq!(batch.last_sequence, 5);
        assert!(!batch.completed);
    }

    #[test]
    fn test_events_after_keeps_cursor_when_nothing_new() {
        let state = state(StreamMode::Streaming);
        push(&state, 1);

        let batch = state.events_after(1);
        assert!(batch.events.is_empty());
        assert_eq!(batch.last_sequence, 1);

        // A cursor past the end must not regress either
        let batch = state.events_after(9);
        assert_eq!(batch.last_sequence, 9);
    }

    #[test]
    fn test_append_after_complete_fails() {
        let state = state(StreamMode::Streaming);
        push(&state, 1);
        assert!(state.complete());
        assert!(!state.complete());

        let seq = state.next_sequence();
        let err = state.append(EventRecord::new(json!(2)), seq).unwrap_err();
        assert!(matches!(err, StreamStoreError::StreamCompleted { .. }));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_signal_fires_on_append() {
        let state = state(StreamMode::Streaming);
        let batch = state.events_after(0);
        assert!(!batch.signal.has_changed());

        push(&state, 1);
        assert!(batch.signal.has_changed());
    }

    #[tokio::test]
    async fn test_signal_wakes_on_complete() {
        let state = std::sync::Arc::new(state(StreamMode::Streaming));
        let batch = state.events_after(0);

        let waiter = tokio::spawn(batch.signal.notified());
        state.complete();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("reader was not woken by completion")
            .unwrap();
        assert!(state.events_after(0).completed);
    }

    #[test]
    fn test_event_ids_in_order() {
        let state = state(StreamMode::Polling);
        push(&state, 1);
        push(&state, 2);
        assert_eq!(state.event_ids(), vec!["1".to_string(), "2".to_string()]);
    }
}
