//! In-process `DistributedCache` with sliding and absolute expiry

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{CacheError, DistributedCache, EntryOptions};

struct CacheEntry {
    value: Vec<u8>,
    created_at: Instant,
    last_access: Instant,
    options: EntryOptions,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        let absolute = self
            .options
            .absolute_expiration
            .is_some_and(|ttl| now.duration_since(self.created_at) >= ttl);
        let sliding = self
            .options
            .sliding_expiration
            .is_some_and(|ttl| now.duration_since(self.last_access) >= ttl);
        absolute || sliding
    }
}

/// Cache held in process memory
///
/// Expired entries are dropped lazily on access; call `purge_expired` to
/// reclaim entries nobody reads again.
#[derive(Default)]
pub struct MemoryDistributedCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryDistributedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of entries, including expired ones not yet purged
    /// Sweep expired entries every `interval` until `shutdown` is cancelled
    ///
    /// Reads only expire the keys they touch; this task reclaims events and
    /// metadata nobody asks for again.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Cache cleanup task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!(purged, "Purged expired cache entries");
                        }
                    }
                }
            }
        })
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }
}

#[async_trait]
impl DistributedCache for MemoryDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }

        Ok(entries.get_mut(key).map(|entry| {
            entry.last_access = now;
            entry.value.clone()
        }))
    }

    async fn set(&self, key: &str, value: Vec<u8>, options: EntryOptions) -> Result<(), CacheError> {
        let now = Instant::now();
        self.entries.lock().insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
                last_access: now,
                options,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let cache = MemoryDistributedCache::new();
        cache.set("k", b"v".to_vec(), EntryOptions::default()).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        cache.remove("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_absolute_expiry() {
        let cache = MemoryDistributedCache::new();
        let options = EntryOptions {
            sliding_expiration: None,
            absolute_expiration: Some(Duration::from_millis(20)),
        };
        cache.set("k", b"v".to_vec(), options).await.unwrap();
        assert!(cache.contains_key("k"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_sliding_expiry_refreshed_by_reads() {
        let cache = MemoryDistributedCache::new();
        let options = EntryOptions {
            sliding_expiration: Some(Duration::from_millis(60)),
            absolute_expiration: None,
        };
        cache.set("k", b"v".to_vec(), options).await.unwrap();

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(cache.get("k").await.unwrap().is_some());
        }

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryDistributedCache::new();
        let short = EntryOptions {
            sliding_expiration: None,
            absolute_expiration: Some(Duration::from_millis(10)),
        };
        cache.set("old", b"1".to_vec(), short).await.unwrap();
        cache.set("new", b"2".to_vec(), EntryOptions::default()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_task_purges_untouched_entries() {
        let cache = Arc::new(MemoryDistributedCache::new());
        let short = EntryOptions {
            sliding_expiration: None,
            absolute_expiration: Some(Duration::from_millis(10)),
        };
        cache.set("a", b"1".to_vec(), short).await.unwrap();
        cache.set("b", b"2".to_vec(), short).await.unwrap();
        cache.set("keep", b"3".to_vec(), EntryOptions::default()).await.unwrap();

        let shutdown = CancellationToken::new();
        let task = cache.spawn_cleanup(Duration::from_millis(10), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("keep"));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("cleanup task ignored shutdown")
            .unwrap();
    }
}
