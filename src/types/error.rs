//! Error types for stream store operations

use thiserror::Error;

/// Result type for stream store operations
pub type StreamStoreResult<T> = Result<T, StreamStoreError>;

/// Errors that can occur in stream store operations
#[derive(Debug, Error)]
pub enum StreamStoreError {
    /// A stream with the same (session, stream) pair already exists
    #[error("stream '{stream_id}' already exists in session '{session_id}'")]
    DuplicateStream { session_id: String, stream_id: String },

    /// The writer tried to append to a completed stream
    #[error("cannot add events to completed stream '{stream_id}' in session '{session_id}'")]
    StreamCompleted { session_id: String, stream_id: String },

    /// The resume point is unknown or has expired
    #[error("resume point not found: {0}")]
    ResumePointNotFound(String),

    /// An event ID could not be decoded
    #[error("invalid event id: {0}")]
    InvalidEventId(String),

    /// The backing cache failed
    #[error("cache error: {0}")]
    Cache(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StreamStoreError {
    pub(crate) fn duplicate(session_id: &str, stream_id: &str) -> Self {
        StreamStoreError::DuplicateStream {
            session_id: session_id.to_string(),
            stream_id: stream_id.to_string(),
        }
    }

    pub(crate) fn completed(session_id: &str, stream_id: &str) -> Self {
        StreamStoreError::StreamCompleted {
            session_id: session_id.to_string(),
            stream_id: stream_id.to_string(),
        }
    }
}
