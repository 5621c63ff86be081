//! In-process key/value cache with per-entry expiry

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    storage::KeyValueCache,
    time::{Clock, SystemClock},
};
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::trace;

struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// LRU-bounded cache. Expired entries are dropped lazily on access.
pub struct InMemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.entries();

        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            trace!(key, "Cache entry expired");
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.entries()
            .put(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        let removed = self.entries().pop(key);
        Ok(removed.is_some_and(|entry| entry.expires_at > now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::ManualClock;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InMemoryCache::new(16);
        cache
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let clock = Arc::new(ManualClock::default());
        let cache = InMemoryCache::with_clock(16, clock.clone());
        cache
            .set("token", "abc".to_string(), Duration::from_secs(3600))
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(3599));
        assert!(cache.get("token").await.unwrap().is_some());

        clock.advance(chrono::Duration::seconds(2));
        assert!(cache.get("token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_of_expired_entry_reports_false() {
        let clock = Arc::new(ManualClock::default());
        let cache = InMemoryCache::with_clock(16, clock.clone());
        cache
            .set("state", "x".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(11));

        assert!(!cache.delete("state").await.unwrap());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let cache = InMemoryCache::new(2);
        for key in ["a", "b", "c"] {
            cache
                .set(key, key.to_string(), Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("c").await.unwrap().is_some());
    }
}
