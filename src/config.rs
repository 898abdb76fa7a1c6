//! Server configuration from environment variables
//!
//! Environment:
//! - SSE_STORE_ADDR: Socket address to bind (default 127.0.0.1:3030)
//! - SSE_STORE_BACKEND: `memory` or `cache` (default memory)
//! - SSE_STORE_KEEP_ALIVE_SECS: SSE keep-alive interval (default 15)
//! - SSE_STORE_EVENT_TTL_SECS: Sliding expiry for cached events (cache backend)
//! - SSE_STORE_POLL_MS: Poll interval for cached streaming readers (cache backend)

use std::net::SocketAddr;
use std::time::Duration;

use tracing::warn;

use crate::event_store::CacheStoreConfig;

/// Which store implementation the server runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Cache,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "cache" => Ok(StoreBackend::Cache),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

/// Configuration for the HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub backend: StoreBackend,
    pub keep_alive: Duration,
    pub cache: CacheStoreConfig,
    /// How often the in-process cache sweeps expired entries
    pub cache_cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
            backend: StoreBackend::Memory,
            keep_alive: Duration::from_secs(15),
            cache: CacheStoreConfig::default(),
            cache_cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Create from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&lookup, "SSE_STORE_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(backend) = parse_var(&lookup, "SSE_STORE_BACKEND") {
            config.backend = backend;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "SSE_STORE_KEEP_ALIVE_SECS") {
            config.keep_alive = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "SSE_STORE_EVENT_TTL_SECS") {
            config.cache.event_sliding_expiration = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "SSE_STORE_POLL_MS") {
            config.cache.poll_interval = Duration::from_millis(ms);
        }
        match parse_var::<u64, _>(&lookup, "SSE_STORE_CACHE_CLEANUP_SECS") {
            Some(0) => warn!("SSE_STORE_CACHE_CLEANUP_SECS must be positive; keeping default"),
            Some(secs) => config.cache_cleanup_interval = Duration::from_secs(secs),
            None => {}
        }

        config
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(variable = name, value = %raw, error = %e, "Ignoring invalid configuration value");
            None
        }
    }
}
