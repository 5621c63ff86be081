//! # Host Bridge Traits
//!
//! Contracts between the photo-sync engine and the infrastructure it runs on.
//!
//! ## Overview
//!
//! The engine never talks to a concrete HTTP stack, database, blob store or
//! cache. Each capability is a trait here, implemented per host (see
//! `bridge-desktop` for the default adapters) and injected at construction.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single-attempt async HTTP; callers own retries
//!
//! ### Persistence
//! - [`EntityStore`](entity::EntityStore) - Labelled nodes and typed edges with guarded upserts
//! - [`ObjectStore`](storage::ObjectStore) - Binary objects (thumbnails, identification images)
//! - [`KeyValueCache`](storage::KeyValueCache) - TTL cache for tokens and rendition URLs
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert library errors into it and keep the message actionable (key,
//! path, status).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared across
//! async tasks behind an `Arc`.

pub mod entity;
pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use entity::{
    AttrPredicate, Attributes, EntityStore, MergeOutcome, NodeRecord, NodeRef, OrderBy,
    RelatedCount, SortOrder, WriteGuard,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{KeyValueCache, ObjectStore, StoredObject};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
