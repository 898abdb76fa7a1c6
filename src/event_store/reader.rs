//! In-memory stream reader

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::stream_state::{EventsAfter, StreamState};
use super::{EventStream, EventStreamReader};
use crate::types::StreamMode;

/// Reader over an in-memory stream, starting after a given sequence
pub struct InMemoryStreamReader {
    state: Arc<StreamState>,
    start_sequence: u64,
}

impl InMemoryStreamReader {
    pub fn new(state: Arc<StreamState>, start_sequence: u64) -> Self {
        Self { state, start_sequence }
    }

    pub fn start_sequence(&self) -> u64 {
        self.start_sequence
    }
}

impl EventStreamReader for InMemoryStreamReader {
    fn session_id(&self) -> &str {
        self.state.session_id()
    }

    fn stream_id(&self) -> &str {
        self.state.stream_id()
    }

    fn read_events(self: Box<Self>, cancel: CancellationToken) -> EventStream {
        let state = self.state;
        let mut cursor = self.start_sequence;

        Box::pin(async_stream::stream! {
            loop {
                if cancel.is_cancelled() {
                    break;
                }

                let EventsAfter { events, last_sequence, completed, signal } = state.events_after(cursor);
                debug!(
                    stream = %state.key(),
                    after = cursor,
                    count = events.len(),
                    "Replaying buffered events"
                );

                for event in events {
                    yield Ok(event);
                }
                cursor = last_sequence;

                if state.mode() == StreamMode::Polling {
                    break;
                }
                if completed {
                    break;
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = signal.notified() => {}
                }
            }
        })
    }
}
