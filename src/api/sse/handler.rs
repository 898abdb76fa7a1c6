//! SSE and stream management HTTP handlers

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::SessionManager;
use crate::api::ApiError;
use crate::event_store::{EventStreamReader, EventStreamStore, EventStreamWriter};
use crate::types::{is_single_line, EventRecord, StreamMode, StreamOptions, StreamStoreError};

/// Header carrying the client's resume point
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Shared state for SSE endpoints
pub struct SseState {
    /// Backing event stream store
    pub store: Arc<dyn EventStreamStore>,
    /// Live sessions and their stream writers
    pub sessions: SessionManager,
    /// Keep-alive interval for open SSE responses
    pub keep_alive: Duration,
    /// Cancelled on server shutdown to end every open reader
    pub shutdown: CancellationToken,
    pub server_name: String,
    pub server_version: String,
}

impl SseState {
    pub fn new(store: Arc<dyn EventStreamStore>) -> Self {
        Self {
            store,
            sessions: SessionManager::new(),
            keep_alive: Duration::from_secs(15),
            shutdown: CancellationToken::new(),
            server_name: "sse-stream-store".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Response for POST /sessions
#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: String,
    pub connected_at: i64,
}

/// Request body for POST /sessions/:session_id/streams
#[derive(Debug, Deserialize)]
pub struct CreateStreamRequest {
    pub stream_id: String,
    #[serde(default)]
    pub mode: StreamMode,
}

/// Response for POST /sessions/:session_id/streams
#[derive(Debug, Serialize)]
pub struct StreamCreated {
    pub session_id: String,
    pub stream_id: String,
    pub mode: StreamMode,
}

/// Request body for POST /sessions/:session_id/streams/:stream_id/events
#[derive(Debug, Deserialize)]
pub struct PublishEventRequest {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub retry_ms: Option<u64>,
}

impl From<PublishEventRequest> for EventRecord {
    fn from(request: PublishEventRequest) -> Self {
        let mut record = EventRecord {
            data: request.data,
            ..Default::default()
        };
        if let Some(event) = request.event {
            record = record.with_event_type(event);
        }
        if let Some(ms) = request.retry_ms {
            record = record.with_reconnection_interval(Duration::from_millis(ms));
        }
        record
    }
}

/// Request body for PUT /sessions/:session_id/streams/:stream_id/mode
#[derive(Debug, Deserialize)]
pub struct SetModeRequest {
    pub mode: StreamMode,
}

/// Convert a stored record into an axum SSE event
///
/// axum rejects CR and LF inside a field, so fields go through the same
/// single-line filtering as `EventRecord::to_sse_frame`.
pub fn to_sse_event(record: &EventRecord) -> Event {
    let mut event = Event::default();
    if let Some(id) = record.sse_event_id() {
        event = event.id(id);
    }
    if let Some(event_type) = record.sse_event_type() {
        event = event.event(event_type);
    }
    if let Some(interval) = record.reconnection_interval {
        event = event.retry(interval);
    }
    event.data(record.sse_data().unwrap_or_default())
}

/// POST /sessions - Start a session
pub async fn create_session_handler(State(state): State<Arc<SseState>>) -> impl IntoResponse {
    let session = state.sessions.create_session().await;
    info!(session_id = %session.session_id, "Session started");

    (
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: session.session_id,
            connected_at: session.connected_at,
        }),
    )
}

/// DELETE /sessions/:session_id - End a session and purge its streams
pub async fn delete_session_handler(
    State(state): State<Arc<SseState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if let Some(session) = state.sessions.remove_session(&session_id).await {
        for writer in session.writers.values() {
            writer.dispose().await?;
        }
    }

    state.store.delete_streams_for_session(&session_id).await?;
    info!(session_id = %session_id, "Session ended");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /sessions/:session_id/streams - Create a stream
pub async fn create_stream_handler(
    State(state): State<Arc<SseState>>,
    Path(session_id): Path<String>,
    Json(request): Json<CreateStreamRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.sessions.contains(&session_id).await {
        return Err(ApiError::not_found(format!("Unknown session: {}", session_id)));
    }

    let options = StreamOptions::new(&session_id, &request.stream_id, request.mode);
    let writer: Arc<dyn EventStreamWriter> = Arc::from(state.store.create_stream(options).await?);

    if !state.sessions.add_writer(&session_id, writer.clone()).await {
        // Session ended while the stream was being created
        writer.dispose().await?;
        state.store.delete_streams_for_session(&session_id).await?;
        return Err(ApiError::not_found(format!("Unknown session: {}", session_id)));
    }

    Ok((
        StatusCode::CREATED,
        Json(StreamCreated {
            session_id,
            stream_id: request.stream_id,
            mode: request.mode,
        }),
    ))
}

async fn stream_writer(
    state: &SseState,
    session_id: &str,
    stream_id: &str,
) -> Result<Arc<dyn EventStreamWriter>, ApiError> {
    state
        .sessions
        .writer(session_id, stream_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("No open writer for stream: {}/{}", session_id, stream_id)))
}

/// POST /sessions/:session_id/streams/:stream_id/events - Publish an event
pub async fn publish_event_handler(
    State(state): State<Arc<SseState>>,
    Path((session_id, stream_id)): Path<(String, String)>,
    Json(request): Json<PublishEventRequest>,
) -> Result<Json<EventRecord>, ApiError> {
    if let Some(ref event) = request.event {
        if !is_single_line(event) {
            return Err(ApiError::bad_request("Event type must not contain CR or LF"));
        }
    }

    let writer = stream_writer(&state, &session_id, &stream_id).await?;
    let record = writer.write_event(request.into()).await?;
    Ok(Json(record))
}

/// PUT /sessions/:session_id/streams/:stream_id/mode - Switch delivery mode
pub async fn set_mode_handler(
    State(state): State<Arc<SseState>>,
    Path((session_id, stream_id)): Path<(String, String)>,
    Json(request): Json<SetModeRequest>,
) -> Result<StatusCode, ApiError> {
    let writer = stream_writer(&state, &session_id, &stream_id).await?;
    writer.set_mode(request.mode).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /sessions/:session_id/streams/:stream_id/close - Complete a stream
pub async fn close_stream_handler(
    State(state): State<Arc<SseState>>,
    Path((session_id, stream_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let writer = state
        .sessions
        .remove_writer(&session_id, &stream_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("No open writer for stream: {}/{}", session_id, stream_id)))?;

    writer.dispose().await?;
    Ok(StatusCode::NO_CONTENT)
}

fn last_event_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// GET /sessions/:session_id/streams/:stream_id - SSE stream, resumable
pub async fn stream_events_handler(
    State(state): State<Arc<SseState>>,
    Path((session_id, stream_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let reader: Box<dyn EventStreamReader> = match last_event_id(&headers) {
        Some(event_id) => {
            let reader = state.store.get_stream_reader(&event_id).await?;
            match reader {
                Some(reader) if reader.session_id() == session_id && reader.stream_id() == stream_id => reader,
                Some(_) => {
                    warn!(event_id = %event_id, "Resume point belongs to another stream");
                    return Err(StreamStoreError::ResumePointNotFound(event_id).into());
                }
                None => {
                    debug!(event_id = %event_id, "Unknown resume point");
                    return Err(StreamStoreError::ResumePointNotFound(event_id).into());
                }
            }
        }
        None => state
            .store
            .open_stream_reader(&session_id, &stream_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Unknown stream: {}/{}", session_id, stream_id)))?,
    };

    let events = reader
        .read_events(state.shutdown.child_token())
        .map(|item| {
            let event = match item {
                Ok(record) => to_sse_event(&record),
                Err(e) => Event::default().event("error").data(e.to_string()),
            };
            Ok::<_, Infallible>(event)
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::default().interval(state.keep_alive)))
}

/// Response for GET /info
#[derive(Debug, Serialize)]
pub struct ServerInfoResponse {
    pub name: String,
    pub version: String,
    pub active_sessions: usize,
}

/// GET /info - Server info
pub async fn server_info_handler(State(state): State<Arc<SseState>>) -> impl IntoResponse {
    Json(ServerInfoResponse {
        name: state.server_name.clone(),
        version: state.server_version.clone(),
        active_sessions: state.sessions.session_count().await,
    })
}
