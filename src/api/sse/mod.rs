//! SSE (Server-Sent Events) transport over the event stream store
//!
//! ## Endpoints
//! - `POST /sessions` - Start a session
//! - `DELETE /sessions/:session_id` - End a session and purge its streams
//! - `POST /sessions/:session_id/streams` - Create a stream
//! - `GET /sessions/:session_id/streams/:stream_id` - SSE stream (honours `Last-Event-ID`)
//! - `POST /sessions/:session_id/streams/:stream_id/events` - Publish an event
//! - `PUT /sessions/:session_id/streams/:stream_id/mode` - Switch streaming/polling
//! - `POST /sessions/:session_id/streams/:stream_id/close` - Complete a stream
//! - `GET /info` - Server info

pub mod handler;
pub mod session;

pub use handler::SseState;
pub use session::{ClientSession, SessionManager};
