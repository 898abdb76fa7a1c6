//! Session management for SSE connections

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::event_store::EventStreamWriter;

/// A live client session and the writers of its streams
#[derive(Clone)]
pub struct ClientSession {
    pub session_id: String,
    pub connected_at: i64,
    pub writers: HashMap<String, Arc<dyn EventStreamWriter>>,
}

/// Session manager for tracking connected clients
pub struct SessionManager {
    sessions: RwLock<HashMap<String, ClientSession>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a new session ID
    pub fn generate_session_id() -> String {
        format!("sess_{}", uuid::Uuid::new_v4().simple())
    }

    /// Create a new session
    pub async fn create_session(&self) -> ClientSession {
        let session = ClientSession {
            session_id: Self::generate_session_id(),
            connected_at: chrono::Utc::now().timestamp(),
            writers: HashMap::new(),
        };

        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        session
    }

    /// Whether a session is live
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Attach a stream writer to a session; returns false if the session is gone
    pub async fn add_writer(&self, session_id: &str, writer: Arc<dyn EventStreamWriter>) -> bool {
        match self.sessions.write().await.get_mut(session_id) {
            Some(session) => {
                session.writers.insert(writer.stream_id().to_string(), writer);
                true
            }
            None => false,
        }
    }

    /// Writer for a stream of a live session
    pub async fn writer(&self, session_id: &str, stream_id: &str) -> Option<Arc<dyn EventStreamWriter>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|session| session.writers.get(stream_id).cloned())
    }

    /// Detach a writer from its session
    pub async fn remove_writer(&self, session_id: &str, stream_id: &str) -> Option<Arc<dyn EventStreamWriter>> {
        self.sessions
            .write()
            .await
            .get_mut(session_id)
            .and_then(|session| session.writers.remove(stream_id))
    }

    /// Remove a session, returning it so its writers can be disposed
    pub async fn remove_session(&self, session_id: &str) -> Option<ClientSession> {
        self.sessions.write().await.remove(session_id)
    }

    /// Get active session count
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
