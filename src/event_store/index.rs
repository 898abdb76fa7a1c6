//! Event Index - resolves event IDs to their stream and sequence

use std::sync::Arc;

use dashmap::DashMap;

use super::stream_state::StreamState;

/// Where an event lives
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub stream: Arc<StreamState>,
    pub sequence: u64,
}

/// Global map from event ID to (stream, sequence)
#[derive(Debug, Default)]
pub struct EventIndex {
    entries: DashMap<String, IndexEntry>,
}

impl EventIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, event_id: String, stream: Arc<StreamState>, sequence: u64) {
        self.entries.insert(event_id, IndexEntry { stream, sequence });
    }

    pub fn resolve(&self, event_id: &str) -> Option<IndexEntry> {
        self.entries.get(event_id).map(|entry| entry.value().clone())
    }

    pub fn unregister(&self, event_id: &str) -> bool {
        self.entries.remove(event_id).is_some()
    }

    /// Remove every entry that points at `stream`
    ///
    /// Only IDs that appear in the stream's log are visited, so the cost is
    /// proportional to the stream rather than to the whole index.
    pub fn purge(&self, stream: &Arc<StreamState>) -> usize {
        stream
            .event_ids()
            .iter()
            .filter(|id| {
                self.entries
                    .remove_if(id.as_str(), |_, entry| Arc::ptr_eq(&entry.stream, stream))
                    .is_some()
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
