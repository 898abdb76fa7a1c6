//! In-memory stream writer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::memory::EventLedger;
use super::stream_state::StreamState;
use super::EventStreamWriter;
use crate::types::{EventRecord, StreamMode, StreamStoreResult};

/// Writer bound to one in-memory stream
///
/// Dropping the writer completes the stream, the same as `dispose`.
#[derive(Debug)]
pub struct InMemoryStreamWriter {
    ledger: Arc<EventLedger>,
    state: Arc<StreamState>,
    /// Serializes sequence assignment and append
    write_lock: Mutex<()>,
    disposed: AtomicBool,
}

impl InMemoryStreamWriter {
    pub(crate) fn new(ledger: Arc<EventLedger>, state: Arc<StreamState>) -> Self {
        Self {
            ledger,
            state,
            write_lock: Mutex::new(()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Stamp and append synchronously
    pub fn write(&self, record: EventRecord) -> StreamStoreResult<EventRecord> {
        if record.event_id.is_some() {
            return Ok(record);
        }

        let _guard = self.write_lock.lock();
        let sequence = self.state.next_sequence();
        let event_id = self.ledger.generate_event_id();
        let stamped = record.stamped(event_id.clone(), sequence);

        // Record first so a concurrent session purge that runs after the
        // append always finds the entry; roll back if the append is refused.
        self.ledger
            .track_event(self.state.key(), &event_id, stamped.reconnection_interval);
        self.ledger.index.register(event_id.clone(), self.state.clone(), sequence);
        if let Err(e) = self.state.append(stamped.clone(), sequence) {
            self.ledger.index.unregister(&event_id);
            self.ledger.untrack_event(&event_id);
            warn!(stream = %self.state.key(), error = %e, "Rejected event for completed stream");
            return Err(e);
        }

        debug!(stream = %self.state.key(), sequence, event_id = %event_id, "Appended event");
        Ok(stamped)
    }

    /// Complete the stream; later calls are no-ops
    pub fn close(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.state.complete() {
            debug!(stream = %self.state.key(), "Stream completed by writer");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStreamWriter for InMemoryStreamWriter {
    fn session_id(&self) -> &str {
        self.state.session_id()
    }

    fn stream_id(&self) -> &str {
        self.state.stream_id()
    }

    async fn write_event(&self, record: EventRecord) -> StreamStoreResult<EventRecord> {
        self.write(record)
    }

    async fn set_mode(&self, mode: StreamMode) -> StreamStoreResult<()> {
        self.state.set_mode(mode);
        debug!(stream = %self.state.key(), %mode, "Stream mode changed");
        Ok(())
    }

    async fn dispose(&self) -> StreamStoreResult<()> {
        self.close();
        Ok(())
    }
}

impl Drop for InMemoryStreamWriter {
    fn drop(&mut self) {
        self.close();
    }
}
