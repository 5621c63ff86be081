//! # Event Bus System
//!
//! Typed notifications published by the auth and sync components over
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event types**: [`AuthEvent`] and [`SyncEvent`] wrapped in [`CoreEvent`]
//! - **EventBus**: cloneable publisher; emission never blocks and never fails
//!   the operation that emits
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::Started {
//!     album_id: "alb-1".to_string(),
//!     album_name: "Reef Trip".to_string(),
//! }))
//! .ok();
//!
//! let event = receiver.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Sync(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `emit` returns `Err` only when nobody is subscribed; publishers ignore it.
//! Slow subscribers see `RecvError::Lagged(n)` and continue from the oldest
//! retained event.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, SendError},
    Receiver,
};

const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Auth(AuthEvent),
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::AssetFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::Connected { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Connection lifecycle of the remote photo service account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// An authorization URL was issued and is awaiting its callback.
    AuthorizationStarted { provider: String },
    /// Code exchange succeeded and tokens were cached.
    Connected {
        provider: String,
        account_id: Option<String>,
    },
    /// Access token was refreshed.
    TokenRefreshed {
        provider: String,
        /// Unix epoch seconds
        expires_at: i64,
    },
    /// Tokens were revoked (best-effort) and removed from the cache.
    Disconnected { provider: String },
    AuthError {
        provider: String,
        message: String,
        /// Whether reconnecting is expected to help
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::AuthorizationStarted { .. } => "Authorization started",
            AuthEvent::Connected { .. } => "Account connected",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed",
            AuthEvent::Disconnected { .. } => "Account disconnected",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

/// Progress of album synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        album_id: String,
        album_name: String,
    },
    /// One asset failed; the album sync continues.
    AssetFailed {
        album_id: String,
        asset_id: String,
        message: String,
    },
    Completed {
        album_id: String,
        total_assets: u64,
        new_assets: u64,
        skipped_assets: u64,
        errors: u64,
    },
    /// The album could not be enumerated, or the sync was cancelled.
    Failed { album_id: String, message: String },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Album sync started",
            SyncEvent::AssetFailed { .. } => "Asset sync failed",
            SyncEvent::Completed { .. } => "Album sync completed",
            SyncEvent::Failed { .. } => "Album sync failed",
        }
    }
}

/// Broadcast publisher shared by all components.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// `capacity` bounds how far a subscriber may fall behind before it lags.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers reached, or an error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// New independent receiver for all future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver that skips events not matching an optional filter.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Next event passing the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Next buffered event passing the filter, without waiting.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(album: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Started {
            album_id: album.to_string(),
            album_name: "Album".to_string(),
        })
    }

    fn connected() -> CoreEvent {
        CoreEvent::Auth(AuthEvent::Connected {
            provider: "lightroom".to_string(),
            account_id: Some("acct".to_string()),
        })
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started("a")).is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.emit(started("a")).unwrap(), 2);
        assert_eq!(first.recv().await.unwrap(), started("a"));
        assert_eq!(second.recv().await.unwrap(), started("a"));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|e| matches!(e, CoreEvent::Auth(_)));

        bus.emit(started("a")).unwrap();
        bus.emit(connected()).unwrap();

        assert_eq!(stream.recv().await.unwrap(), connected());
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut receiver = bus.subscribe();
        for i in 0..5 {
            bus.emit(started(&i.to_string())).unwrap();
        }

        assert!(matches!(receiver.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(receiver.recv().await.unwrap(), started("3"));
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(connected().severity(), EventSeverity::Info);
        assert_eq!(started("a").severity(), EventSeverity::Debug);
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            album_id: "a".to_string(),
            message: "boom".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(failed.description(), "Album sync failed");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Sync(SyncEvent::Completed {
            album_id: "alb".to_string(),
            total_assets: 5,
            new_assets: 4,
            skipped_assets: 0,
            errors: 1,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Sync");
        assert_eq!(json["payload"]["event"], "Completed");

        let decoded: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, event);
    }
}
