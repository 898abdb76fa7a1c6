//! Event Store Module for resumable SSE streams
//!
//! This module provides the stream store behind the SSE transport:
//! - `EventStreamStore`: creates streams, resolves resume points, cleans up sessions
//! - `EventStreamWriter`: stamps and appends events to one stream
//! - `EventStreamReader`: replays and follows one stream from a resume point
//!
//! Two interchangeable backends implement the traits:
//! - `InMemoryEventStreamStore`: process-local log with push wake-ups
//! - `CacheEventStreamStore`: events kept in a `DistributedCache` with expiry
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//! ┌───────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ Transport │───►│ write_event  │───►│ StreamState  │───►│ wake readers │
//! │ (writer)  │    │ seq + id     │    │ append       │    │              │
//! └───────────┘    └──────┬───────┘    └──────────────┘    └──────────────┘
//!                         └──────────► EventIndex.register
//!
//! Resume Path:
//! ┌───────────────┐    ┌─────────────────┐    ┌──────────────┐
//! │ Last-Event-ID │───►│ EventIndex      │───►│ replay, then │───► wait / stop
//! │               │    │ resolve         │    │ follow live  │
//! └───────────────┘    └─────────────────┘    └──────────────┘
//! ```

pub mod cache;
mod index;
mod memory;
mod reader;
mod sessions;
mod stream_state;
mod writer;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::types::{EventRecord, StreamMode, StreamOptions, StreamStoreResult};

pub use cache::{
    CacheError, CacheEventStreamStore, CacheStoreConfig, DistributedCache, EntryOptions, MemoryDistributedCache,
};
pub use index::{EventIndex, IndexEntry};
pub use memory::InMemoryEventStreamStore;
pub use reader::InMemoryStreamReader;
pub use sessions::SessionRegistry;
pub use stream_state::{EventsAfter, NewEventSignal, StreamState};
pub use writer::InMemoryStreamWriter;

/// Ordered, lazily produced events from a reader
pub type EventStream = BoxStream<'static, StreamStoreResult<EventRecord>>;

/// Storage for resumable event streams
#[async_trait]
pub trait EventStreamStore: Send + Sync {
    /// Create a stream and return its writer
    ///
    /// Fails with `DuplicateStream` if the (session, stream) pair exists.
    async fn create_stream(&self, options: StreamOptions) -> StreamStoreResult<Box<dyn EventStreamWriter>>;

    /// Reader positioned just after `last_event_id`, or `None` if the
    /// resume point is unknown
    async fn get_stream_reader(&self, last_event_id: &str) -> StreamStoreResult<Option<Box<dyn EventStreamReader>>>;

    /// Reader positioned at the start of an existing stream
    async fn open_stream_reader(
        &self,
        session_id: &str,
        stream_id: &str,
    ) -> StreamStoreResult<Option<Box<dyn EventStreamReader>>>;

    /// Remove every stream of a session and their events (idempotent)
    async fn delete_streams_for_session(&self, session_id: &str) -> StreamStoreResult<()>;
}

/// Sole producer handle for one stream
#[async_trait]
pub trait EventStreamWriter: Send + Sync {
    fn session_id(&self) -> &str;

    fn stream_id(&self) -> &str;

    /// Stamp and append an event, returning the stamped record
    ///
    /// Records that already carry an event ID are returned unchanged.
    async fn write_event(&self, record: EventRecord) -> StreamStoreResult<EventRecord>;

    async fn set_mode(&self, mode: StreamMode) -> StreamStoreResult<()>;

    /// Mark the stream completed; safe to call more than once
    async fn dispose(&self) -> StreamStoreResult<()>;
}

/// Consumer handle anchored at a resume point
pub trait EventStreamReader: Send {
    fn session_id(&self) -> &str;

    fn stream_id(&self) -> &str;

    /// Replay buffered events and, in streaming mode, follow the stream
    ///
    /// The returned stream ends when the stream is completed, when the
    /// stream is in polling mode and the backlog is drained, or when
    /// `cancel` fires. Dropping it has the same effect as cancelling.
    fn read_events(self: Box<Self>, cancel: CancellationToken) -> EventStream;
}
