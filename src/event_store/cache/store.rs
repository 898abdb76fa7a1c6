//! `EventStreamStore` on top of a `DistributedCache`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CacheStoreConfig, DistributedCache, EntryOptions};
use crate::event_store::{
    EventStream, EventStreamReader, EventStreamStore, EventStreamWriter, SessionRegistry,
};
use crate::types::{EventRecord, StreamMode, StreamOptions, StreamStoreError, StreamStoreResult};

const KEY_PREFIX: &str = "sse:v1";

/// Value stored under a deletion marker key
const DELETED_MARKER: &[u8] = b"1";

/// Per-stream metadata stored next to the events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamMetadata {
    mode: StreamMode,
    completed: bool,
    last_sequence: u64,
    /// Distinguishes a stream from earlier streams with the same ids
    generation: String,
}

/// Cache coordinates of one (session, stream) pair
#[derive(Debug, Clone, PartialEq, Eq)]
struct StreamLocation {
    session_id: String,
    stream_id: String,
    session_b64: String,
    stream_b64: String,
}

impl StreamLocation {
    fn new(session_id: &str, stream_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            stream_id: stream_id.to_string(),
            session_b64: STANDARD.encode(session_id),
            stream_b64: STANDARD.encode(stream_id),
        }
    }

    fn metadata_key(&self) -> String {
        format!("{}:meta:{}:{}", KEY_PREFIX, self.session_b64, self.stream_b64)
    }

    fn instance(&self, generation: impl Into<String>) -> StreamInstance {
        StreamInstance {
            location: self.clone(),
            generation: generation.into(),
        }
    }
}

impl std::fmt::Display for StreamLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.session_id, self.stream_id)
    }
}

/// One generation of a stream
///
/// Creating a pair again after its session was deleted mints a new
/// generation, so event keys and IDs never collide with the old stream.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StreamInstance {
    location: StreamLocation,
    generation: String,
}

impl StreamInstance {
    fn event_key(&self, sequence: u64) -> String {
        format!(
            "{}:event:{}:{}:{}:{}",
            KEY_PREFIX, self.location.session_b64, self.location.stream_b64, self.generation, sequence
        )
    }

    fn deleted_key(&self) -> String {
        format!(
            "{}:deleted:{}:{}:{}",
            KEY_PREFIX, self.location.session_b64, self.location.stream_b64, self.generation
        )
    }

    fn event_id(&self, sequence: u64) -> String {
        format!(
            "{}:{}:{}:{}",
            self.location.session_b64, self.location.stream_b64, self.generation, sequence
        )
    }

    /// Decode an event ID back into its stream generation and sequence
    fn parse_event_id(event_id: &str) -> StreamStoreResult<(Self, u64)> {
        let invalid = || StreamStoreError::InvalidEventId(event_id.to_string());

        let mut parts = event_id.splitn(4, ':');
        let (Some(session_b64), Some(stream_b64), Some(generation), Some(sequence)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let decode = |part: &str| -> StreamStoreResult<String> {
            let bytes = STANDARD.decode(part).map_err(|_| invalid())?;
            String::from_utf8(bytes).map_err(|_| invalid())
        };
        let session_id = decode(session_b64)?;
        let stream_id = decode(stream_b64)?;
        if generation.is_empty() || !generation.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(invalid());
        }
        let sequence: u64 = sequence.parse().map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }

        Ok((StreamLocation::new(&session_id, &stream_id).instance(generation), sequence))
    }
}

impl std::fmt::Display for StreamInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.location, self.generation)
    }
}

fn new_generation() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

async fn load_metadata<C: DistributedCache + ?Sized>(
    cache: &C,
    location: &StreamLocation,
) -> StreamStoreResult<Option<StreamMetadata>> {
    match cache.get(&location.metadata_key()).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Metadata for `instance`, or `None` if the stream is gone or was replaced
async fn load_current<C: DistributedCache + ?Sized>(
    cache: &C,
    instance: &StreamInstance,
) -> StreamStoreResult<Option<StreamMetadata>> {
    Ok(load_metadata(cache, &instance.location)
        .await?
        .filter(|metadata| metadata.generation == instance.generation))
}

async fn save_metadata<C: DistributedCache + ?Sized>(
    cache: &C,
    location: &StreamLocation,
    metadata: &StreamMetadata,
    options: EntryOptions,
) -> StreamStoreResult<()> {
    let bytes = serde_json::to_vec(metadata)?;
    cache.set(&location.metadata_key(), bytes, options).await?;
    Ok(())
}

async fn mark_completed<C: DistributedCache + ?Sized>(
    cache: &C,
    instance: &StreamInstance,
    options: EntryOptions,
) -> StreamStoreResult<bool> {
    match load_current(cache, instance).await? {
        Some(mut metadata) if !metadata.completed => {
            metadata.completed = true;
            save_metadata(cache, &instance.location, &metadata, options).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Event stream store persisted in a `DistributedCache`
///
/// Session membership is tracked in process so that ending a session can
/// remove every cached key belonging to it.
pub struct CacheEventStreamStore<C: DistributedCache + 'static> {
    cache: Arc<C>,
    config: CacheStoreConfig,
    sessions: SessionRegistry,
}

impl<C: DistributedCache + 'static> CacheEventStreamStore<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self::with_config(cache, CacheStoreConfig::default())
    }

    pub fn with_config(cache: Arc<C>, config: CacheStoreConfig) -> Self {
        Self {
            cache,
            config,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn config(&self) -> &CacheStoreConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// Create a stream and return the concrete writer
    pub async fn create(&self, options: StreamOptions) -> StreamStoreResult<CacheStreamWriter<C>> {
        let location = StreamLocation::new(&options.session_id, &options.stream_id);

        // The cache offers no compare-and-set, so this check is best effort
        // against concurrent creation of the same pair.
        if load_metadata(&*self.cache, &location).await?.is_some() {
            return Err(StreamStoreError::duplicate(&options.session_id, &options.stream_id));
        }

        let metadata = StreamMetadata {
            mode: options.mode,
            completed: false,
            last_sequence: 0,
            generation: new_generation(),
        };
        save_metadata(&*self.cache, &location, &metadata, self.config.metadata_entry_options()).await?;

        self.sessions
            .record_stream_for_session(&options.session_id, &options.stream_id);
        let instance = location.instance(metadata.generation);
        info!(stream = %instance, mode = %options.mode, "Created cached event stream");

        Ok(CacheStreamWriter {
            cache: self.cache.clone(),
            config: self.config.clone(),
            instance,
            write_lock: tokio::sync::Mutex::new(()),
            disposed: AtomicBool::new(false),
        })
    }

    /// Reader positioned after `sequence` on an existing stream generation
    async fn reader_at(
        &self,
        instance: StreamInstance,
        sequence: u64,
    ) -> StreamStoreResult<Option<CacheStreamReader<C>>> {
        let Some(metadata) = load_current(&*self.cache, &instance).await? else {
            debug!(stream = %instance, "Stream metadata missing, expired or replaced");
            return Ok(None);
        };
        if sequence > metadata.last_sequence {
            return Ok(None);
        }

        Ok(Some(CacheStreamReader {
            cache: self.cache.clone(),
            instance,
            poll_interval: self.config.poll_interval,
            start_sequence: sequence,
        }))
    }

    /// Remove every cached key of a session; returns the number of streams removed
    ///
    /// Streams that fail to delete stay registered, so a later call retries
    /// them. The first error is returned after every stream was attempted.
    pub async fn delete_session(&self, session_id: &str) -> StreamStoreResult<usize> {
        let Some(stream_ids) = self.sessions.take_streams_for_session(session_id) else {
            debug!(session_id, "No cached streams to delete for session");
            return Ok(0);
        };

        let mut removed = 0;
        let mut first_error = None;
        for stream_id in stream_ids {
            let location = StreamLocation::new(session_id, &stream_id);
            match self.delete_stream(&location).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(stream = %location, error = %e, "Failed to delete cached stream");
                    self.sessions.record_stream_for_session(session_id, &stream_id);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        info!(session_id, streams = removed, "Deleted cached streams for session");
        Ok(removed)
    }

    async fn delete_stream(&self, location: &StreamLocation) -> StreamStoreResult<bool> {
        let Some(metadata) = load_metadata(&*self.cache, location).await? else {
            return Ok(false);
        };
        let instance = location.instance(metadata.generation.clone());

        // Writers check for the marker after saving, so any append that
        // misses it is already counted in the metadata loaded below.
        self.cache
            .set(&instance.deleted_key(), DELETED_MARKER.to_vec(), self.config.metadata_entry_options())
            .await?;
        let last_sequence = load_current(&*self.cache, &instance)
            .await?
            .map_or(metadata.last_sequence, |current| current.last_sequence);

        for sequence in 1..=last_sequence {
            self.cache.remove(&instance.event_key(sequence)).await?;
        }
        self.cache.remove(&location.metadata_key()).await?;
        debug!(stream = %instance, events = last_sequence, "Deleted cached stream");
        Ok(true)
    }
}

#[async_trait]
impl<C: DistributedCache + 'static> EventStreamStore for CacheEventStreamStore<C> {
    async fn create_stream(&self, options: StreamOptions) -> StreamStoreResult<Box<dyn EventStreamWriter>> {
        let writer = self.create(options).await?;
        Ok(Box::new(writer) as Box<dyn EventStreamWriter>)
    }

    async fn get_stream_reader(&self, last_event_id: &str) -> StreamStoreResult<Option<Box<dyn EventStreamReader>>> {
        let (instance, sequence) = match StreamInstance::parse_event_id(last_event_id) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "Unresolvable resume point");
                return Ok(None);
            }
        };

        Ok(self
            .reader_at(instance, sequence)
            .await?
            .map(|reader| Box::new(reader) as Box<dyn EventStreamReader>))
    }

    async fn open_stream_reader(
        &self,
        session_id: &str,
        stream_id: &str,
    ) -> StreamStoreResult<Option<Box<dyn EventStreamReader>>> {
        let location = StreamLocation::new(session_id, stream_id);
        let Some(metadata) = load_metadata(&*self.cache, &location).await? else {
            return Ok(None);
        };

        Ok(self
            .reader_at(location.instance(metadata.generation), 0)
            .await?
            .map(|reader| Box::new(reader) as Box<dyn EventStreamReader>))
    }

    async fn delete_streams_for_session(&self, session_id: &str) -> StreamStoreResult<()> {
        self.delete_session(session_id).await.map(|_| ())
    }
}

/// Writer for a cached stream
///
/// Dropping an undisposed writer inside a Tokio runtime completes the
/// stream in a background task.
pub struct CacheStreamWriter<C: DistributedCache + 'static> {
    cache: Arc<C>,
    config: CacheStoreConfig,
    instance: StreamInstance,
    write_lock: tokio::sync::Mutex<()>,
    disposed: AtomicBool,
}

impl<C: DistributedCache + 'static> CacheStreamWriter<C> {
    fn completed_error(&self) -> StreamStoreError {
        StreamStoreError::completed(&self.instance.location.session_id, &self.instance.location.stream_id)
    }

    /// Undo an append that raced a session delete
    async fn discard(&self, event_key: &str) -> StreamStoreResult<StreamStoreError> {
        self.cache.remove(event_key).await?;
        if load_current(&*self.cache, &self.instance).await?.is_some() {
            self.cache.remove(&self.instance.location.metadata_key()).await?;
        }
        warn!(stream = %self.instance, "Discarded event appended during session cleanup");
        Ok(self.completed_error())
    }
}

#[async_trait]
impl<C: DistributedCache + 'static> EventStreamWriter for CacheStreamWriter<C> {
    fn session_id(&self) -> &str {
        &self.instance.location.session_id
    }

    fn stream_id(&self) -> &str {
        &self.instance.location.stream_id
    }

    async fn write_event(&self, record: EventRecord) -> StreamStoreResult<EventRecord> {
        if record.event_id.is_some() {
            return Ok(record);
        }

        let _guard = self.write_lock.lock().await;
        let mut metadata = match load_current(&*self.cache, &self.instance).await? {
            Some(metadata) if !metadata.completed => metadata,
            _ => {
                warn!(stream = %self.instance, "Rejected event for completed or expired stream");
                return Err(self.completed_error());
            }
        };

        let sequence = metadata.last_sequence + 1;
        let stamped = record.stamped(self.instance.event_id(sequence), sequence);

        let event_key = self.instance.event_key(sequence);
        let bytes = serde_json::to_vec(&stamped)?;
        self.cache
            .set(&event_key, bytes, self.config.event_entry_options())
            .await?;

        // The stream may have been deleted while the event was being stored
        match load_current(&*self.cache, &self.instance).await? {
            Some(current) if !current.completed => {}
            _ => return Err(self.discard(&event_key).await?),
        }

        metadata.last_sequence = sequence;
        save_metadata(
            &*self.cache,
            &self.instance.location,
            &metadata,
            self.config.metadata_entry_options(),
        )
        .await?;

        if self.cache.get(&self.instance.deleted_key()).await?.is_some() {
            return Err(self.discard(&event_key).await?);
        }

        debug!(stream = %self.instance, sequence, "Appended cached event");
        Ok(stamped)
    }

    async fn set_mode(&self, mode: StreamMode) -> StreamStoreResult<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(mut metadata) = load_current(&*self.cache, &self.instance).await? {
            metadata.mode = mode;
            save_metadata(
                &*self.cache,
                &self.instance.location,
                &metadata,
                self.config.metadata_entry_options(),
            )
            .await?;
            debug!(stream = %self.instance, %mode, "Cached stream mode changed");
        }
        Ok(())
    }

    async fn dispose(&self) -> StreamStoreResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        if mark_completed(&*self.cache, &self.instance, self.config.metadata_entry_options()).await? {
            debug!(stream = %self.instance, "Cached stream completed by writer");
        }
        Ok(())
    }
}

impl<C: DistributedCache + 'static> Drop for CacheStreamWriter<C> {
    fn drop(&mut self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(stream = %self.instance, "Writer dropped outside a runtime; stream left open");
            return;
        };

        let cache = self.cache.clone();
        let instance = self.instance.clone();
        let options = self.config.metadata_entry_options();
        handle.spawn(async move {
            if let Err(e) = mark_completed(&*cache, &instance, options).await {
                warn!(stream = %instance, error = %e, "Failed to complete dropped stream");
            }
        });
    }
}

/// Reader for a cached stream
///
/// Streaming-mode readers poll the stream metadata for new events.
pub struct CacheStreamReader<C: DistributedCache + 'static> {
    cache: Arc<C>,
    instance: StreamInstance,
    poll_interval: Duration,
    start_sequence: u64,
}

impl<C: DistributedCache + 'static> EventStreamReader for CacheStreamReader<C> {
    fn session_id(&self) -> &str {
        &self.instance.location.session_id
    }

    fn stream_id(&self) -> &str {
        &self.instance.location.stream_id
    }

    fn read_events(self: Box<Self>, cancel: CancellationToken) -> EventStream {
        let CacheStreamReader {
            cache,
            instance,
            poll_interval,
            start_sequence,
        } = *self;

        Box::pin(async_stream::stream! {
            let mut cursor = start_sequence;

            loop {
                if cancel.is_cancelled() {
                    break;
                }

                let metadata = match load_current(&*cache, &instance).await {
                    Ok(Some(metadata)) => metadata,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };

                while cursor < metadata.last_sequence {
                    cursor += 1;
                    match cache.get(&instance.event_key(cursor)).await {
                        Ok(Some(bytes)) => match serde_json::from_slice::<EventRecord>(&bytes) {
                            Ok(record) => {
                                yield Ok(record);
                            }
                            Err(e) => {
                                yield Err(StreamStoreError::from(e));
                                return;
                            }
                        },
                        Ok(None) => {
                            debug!(stream = %instance, sequence = cursor, "Cached event expired");
                        }
                        Err(e) => {
                            yield Err(StreamStoreError::from(e));
                            return;
                        }
                    }
                }

                if metadata.mode == StreamMode::Polling || metadata.completed {
                    break;
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        })
    }
}
