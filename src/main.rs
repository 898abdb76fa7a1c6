//! SSE Stream Store - Binary Entry Point
//!
//! Serves the SSE transport over the configured event stream store.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use sse_stream_store::api::http::create_router;
use sse_stream_store::api::sse::SseState;
use sse_stream_store::config::{ServerConfig, StoreBackend};
use sse_stream_store::logging::init_tracing;
use sse_stream_store::{CacheEventStreamStore, EventStreamStore, InMemoryEventStreamStore, MemoryDistributedCache};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config = ServerConfig::from_env();
    let shutdown = CancellationToken::new();

    let store: Arc<dyn EventStreamStore> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryEventStreamStore::new()),
        StoreBackend::Cache => {
            let cache = Arc::new(MemoryDistributedCache::new());
            cache.spawn_cleanup(config.cache_cleanup_interval, shutdown.child_token());
            Arc::new(CacheEventStreamStore::with_config(cache, config.cache.clone()))
        }
    };

    let state = SseState::new(store)
        .with_keep_alive(config.keep_alive)
        .with_shutdown(shutdown.clone());
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, backend = ?config.backend, "SSE stream server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down, closing open streams");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
