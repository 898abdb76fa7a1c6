//! Cache-backed event stream store
//!
//! Events and per-stream metadata are kept in a [`DistributedCache`] under
//! independent expiry policies: events expire sooner, metadata lives longer
//! so a reconnecting client can still learn that its backlog is gone.
//!
//! # Key layout
//!
//! ```text
//! sse:v1:meta:{b64(session)}:{b64(stream)}               -> {"mode","completed","lastSequence","generation"}
//! sse:v1:event:{b64(session)}:{b64(stream)}:{gen}:{seq}   -> EventRecord JSON
//! sse:v1:deleted:{b64(session)}:{b64(stream)}:{gen}       -> deletion marker
//! event id = {b64(session)}:{b64(stream)}:{gen}:{seq}
//! ```
//!
//! `gen` is fresh for every created stream, so IDs from a deleted stream
//! never resolve into a later stream with the same session and stream ids.

mod config;
mod memory_cache;
mod store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use config::CacheStoreConfig;
pub use memory_cache::MemoryDistributedCache;
pub use store::{CacheEventStreamStore, CacheStreamReader, CacheStreamWriter};

/// Errors raised by a cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache operation failed: {0}")]
    Backend(String),
}

impl From<CacheError> for crate::types::StreamStoreError {
    fn from(e: CacheError) -> Self {
        crate::types::StreamStoreError::Cache(e.to_string())
    }
}

/// Expiry policy for one cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryOptions {
    /// Expire if not read or written for this long
    pub sliding_expiration: Option<Duration>,
    /// Expire this long after being written, regardless of access
    pub absolute_expiration: Option<Duration>,
}

impl EntryOptions {
    pub fn new(sliding: Duration, absolute: Duration) -> Self {
        Self {
            sliding_expiration: Some(sliding),
            absolute_expiration: Some(absolute),
        }
    }
}

/// Byte-oriented key/value cache with per-entry expiry
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Fetch a value, refreshing its sliding expiry
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, options: EntryOptions) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}
