//! SSE Stream Store
//!
//! A resumable event-stream store for server-sent events. Events pushed
//! into a stream are stamped with a sequence number and a globally unique
//! event ID; a client that disconnects can reconnect with its last event ID
//! and receive exactly the events it missed.
//!
//! # Features
//!
//! - **Resumable**: Replay from any `Last-Event-ID` without loss or duplication
//! - **Two Modes**: Streaming (block for new events) or polling (drain and return)
//! - **Session Cleanup**: Ending a session purges all of its streams and index entries
//! - **Pluggable Backends**: In-memory log or expiring distributed cache
//!
//! # Modules
//!
//! - `types`: Event records, stream modes and errors
//! - `event_store`: Store traits and the in-memory and cache backends
//! - `api`: Axum SSE transport over the store
//! - `config`: Server configuration from the environment
//! - `logging`: Tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use sse_stream_store::{EventRecord, EventStreamReader, InMemoryEventStreamStore, StreamMode, StreamOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryEventStreamStore::new();
//! let writer = store.create(StreamOptions::new("session-1", "stream-1", StreamMode::Polling))?;
//! let first = writer.write(EventRecord::new(serde_json::json!({"step": 1})))?;
//! writer.write(EventRecord::new(serde_json::json!({"step": 2})))?;
//!
//! // Resume after the first event
//! let reader = store.reader_after(first.event_id.as_deref().unwrap_or_default()).unwrap();
//! let missed: Vec<_> = Box::new(reader).read_events(CancellationToken::new()).collect().await;
//! assert_eq!(missed.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod event_store;
pub mod logging;
pub mod types;

// Re-export commonly used items at crate root
pub use event_store::{
    CacheEventStreamStore, CacheStoreConfig, EventStreamReader, EventStreamStore, EventStreamWriter,
    InMemoryEventStreamStore, MemoryDistributedCache,
};
pub use types::{EventRecord, StreamKey, StreamMode, StreamOptions, StreamStoreError, StreamStoreResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
