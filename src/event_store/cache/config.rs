//! Configuration for the cache-backed store

use std::time::Duration;

use super::EntryOptions;

/// Expiry and polling settings for `CacheEventStreamStore`
#[derive(Debug, Clone)]
pub struct CacheStoreConfig {
    /// Sliding expiry for individual events
    pub event_sliding_expiration: Duration,
    /// Absolute expiry for individual events
    pub event_absolute_expiration: Duration,
    /// Sliding expiry for per-stream metadata
    pub metadata_sliding_expiration: Duration,
    /// Absolute expiry for per-stream metadata
    pub metadata_absolute_expiration: Duration,
    /// How often a streaming reader checks for new events
    pub poll_interval: Duration,
}

impl Default for CacheStoreConfig {
    fn default() -> Self {
        Self {
            event_sliding_expiration: Duration::from_secs(5 * 60),
            event_absolute_expiration: Duration::from_secs(30 * 60),
            metadata_sliding_expiration: Duration::from_secs(30 * 60),
            metadata_absolute_expiration: Duration::from_secs(2 * 60 * 60),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl CacheStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set event expiry (sliding, absolute)
    pub fn with_event_expiration(mut self, sliding: Duration, absolute: Duration) -> Self {
        self.event_sliding_expiration = sliding;
        self.event_absolute_expiration = absolute;
        self
    }

    /// Set metadata expiry (sliding, absolute)
    pub fn with_metadata_expiration(mut self, sliding: Duration, absolute: Duration) -> Self {
        self.metadata_sliding_expiration = sliding;
        self.metadata_absolute_expiration = absolute;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn event_entry_options(&self) -> EntryOptions {
        EntryOptions::new(self.event_sliding_expiration, self.event_absolute_expiration)
    }

    pub fn metadata_entry_options(&self) -> EntryOptions {
        EntryOptions::new(self.metadata_sliding_expiration, self.metadata_absolute_expiration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_outlives_events_by_default() {
        let config = CacheStoreConfig::default();
        assert!(config.metadata_sliding_expiration > config.event_sliding_expiration);
        assert!(config.metadata_absolute_expiration > config.event_absolute_expiration);
    }

    #[test]
    fn test_builder_setters() {
        let config = CacheStoreConfig::new()
            .with_event_expiration(Duration::from_secs(1), Duration::from_secs(2))
            .with_poll_interval(Duration::from_millis(5));

        let options = config.event_entry_options();
        assert_eq!(options.sliding_expiration, Some(Duration::from_secs(1)));
        assert_eq!(options.absolute_expiration, Some(Duration::from_secs(2)));
        assert_eq!(config.poll_interval, Duration::from_millis(5));
    }
}
