//! Data types for the SSE stream store
//!
//! This module contains the core data structures shared by the store
//! backends and the HTTP transport.

mod error;
mod event;

pub use error::{StreamStoreError, StreamStoreResult};
pub use event::{is_single_line, EventRecord, StreamKey, StreamMode, StreamOptions};
