//! Session registry - which streams belong to which session

use std::collections::BTreeSet;

use dashmap::DashMap;

/// Tracks the stream IDs created under each session
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, BTreeSet<String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `stream_id` was created under `session_id`
    pub fn record_stream_for_session(&self, session_id: &str, stream_id: &str) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(stream_id.to_string());
    }

    /// Atomically remove and return the session's stream set
    ///
    /// Only one of several concurrent callers receives the set; the others
    /// get `None`.
    pub fn take_streams_for_session(&self, session_id: &str) -> Option<BTreeSet<String>> {
        self.sessions.remove(session_id).map(|(_, streams)| streams)
    }

    pub fn streams_for_session(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .get(session_id)
            .map(|streams| streams.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
