//! Pending authorization sessions keyed by OAuth `state`.
//!
//! A session is written when an authorization URL is issued and taken back
//! exactly once when the callback arrives. Sessions older than the TTL are
//! treated as absent.

use crate::error::Result;
use crate::types::OAuthSession;
use async_trait::async_trait;
use bridge_traits::storage::{get_json, set_json, KeyValueCache};
use bridge_traits::time::{Clock, SystemClock};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait PendingAuthStore: Send + Sync {
    async fn insert(&self, session: OAuthSession) -> Result<()>;

    /// Remove and return the session for `state`.
    ///
    /// Atomic: of several concurrent callers with the same state at most one
    /// receives `Some`.
    async fn take(&self, state: &str) -> Result<Option<OAuthSession>>;

    /// Drop expired sessions, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

/// Process-local store.
pub struct InMemoryPendingAuthStore {
    sessions: Mutex<HashMap<String, OAuthSession>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryPendingAuthStore {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PendingAuthStore for InMemoryPendingAuthStore {
    async fn insert(&self, session: OAuthSession) -> Result<()> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        // abandoned flows would otherwise accumulate
        sessions.retain(|_, s| !s.is_expired(now, self.ttl));
        sessions.insert(session.state.clone(), session);
        Ok(())
    }

    async fn take(&self, state: &str) -> Result<Option<OAuthSession>> {
        let now = self.clock.now();
        let session = self.sessions.lock().await.remove(state);
        Ok(session.filter(|s| !s.is_expired(now, self.ttl)))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now, self.ttl));
        let purged = before - sessions.len();
        if purged > 0 {
            debug!(purged, "Purged expired authorization sessions");
        }
        Ok(purged)
    }
}

/// Store backed by the shared key/value cache, so any process sharing the
/// cache can complete a flow started by another.
pub struct CachePendingAuthStore {
    cache: Arc<dyn KeyValueCache>,
    namespace: String,
    ttl: std::time::Duration,
    clock: Arc<dyn Clock>,
}

impl CachePendingAuthStore {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        namespace: impl Into<String>,
        ttl: std::time::Duration,
    ) -> Self {
        Self::with_clock(cache, namespace, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        cache: Arc<dyn KeyValueCache>,
        namespace: impl Into<String>,
        ttl: std::time::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
            ttl,
            clock,
        }
    }

    fn key(&self, state: &str) -> String {
        format!("{}:oauth_state:{}", self.namespace, state)
    }
}

#[async_trait]
impl PendingAuthStore for CachePendingAuthStore {
    async fn insert(&self, session: OAuthSession) -> Result<()> {
        let key = self.key(&session.state);
        set_json(self.cache.as_ref(), &key, &session, self.ttl).await?;
        Ok(())
    }

    async fn take(&self, state: &str) -> Result<Option<OAuthSession>> {
        let key = self.key(state);
        let Some(session) = get_json::<OAuthSession>(self.cache.as_ref(), &key).await? else {
            return Ok(None);
        };

        // the delete outcome decides which concurrent caller wins
        if !self.cache.delete(&key).await? {
            return Ok(None);
        }

        let ttl = Duration::from_std(self.ttl).unwrap_or(Duration::MAX);
        Ok(Some(session).filter(|s| !s.is_expired(self.clock.now(), ttl)))
    }

    async fn purge_expired(&self) -> Result<usize> {
        // entries carry their own cache TTL
        Ok(0)
    }
}
