//! Object Storage and Cache Abstractions
//!
//! Contracts for binary object persistence (thumbnails, identification
//! images) and for a TTL key/value cache (tokens, pending authorizations,
//! rendition URL bundles).

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Result of a successful object write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
}

/// Binary object store keyed by slash-separated paths.
///
/// Writing the same key twice overwrites, so deterministic keys make
/// re-uploads idempotent.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<StoredObject>;

    /// Read an object; `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Delete an object, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Public URL for an object key.
    fn url_for(&self, key: &str) -> String;
}

/// Key/value cache with per-entry expiry.
///
/// Values are opaque strings; use [`get_json`] and [`set_json`] for typed
/// payloads.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::{set_json, KeyValueCache};
///
/// async fn remember(cache: &dyn KeyValueCache, urls: &Bundle) -> Result<()> {
///     set_json(cache, "photos:renditions:a1", urls, Duration::from_secs(86_400)).await
/// }
/// ```
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove an entry, returning whether a live entry was removed.
    ///
    /// Exactly one of several concurrent callers deleting the same live key
    /// observes `true`.
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Read a JSON value from the cache.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn KeyValueCache,
    key: &str,
) -> Result<Option<T>> {
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Write a JSON value to the cache.
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn KeyValueCache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, raw, ttl).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapCache {
        entries: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl KeyValueCache for MapCache {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: String, _ttl: Duration) -> Result<()> {
            self.entries.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<bool> {
            Ok(self.entries.lock().unwrap().remove(key).is_some())
        }
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let cache = MapCache::default();
        let mut bundle = HashMap::new();
        bundle.insert("thumbnail".to_string(), Some("https://cdn/t.jpg".to_string()));
        bundle.insert("2048".to_string(), None);

        set_json(&cache, "k", &bundle, Duration::from_secs(60))
            .await
            .unwrap();
        let loaded: HashMap<String, Option<String>> =
            get_json(&cache, "k").await.unwrap().unwrap();
        assert_eq!(loaded, bundle);

        let missing: Option<HashMap<String, String>> = get_json(&cache, "nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_get_json_rejects_garbage() {
        let cache = MapCache::default();
        cache
            .set("k", "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let result: Result<Option<Vec<String>>> = get_json(&cache, "k").await;
        assert!(result.is_err());
    }
}
