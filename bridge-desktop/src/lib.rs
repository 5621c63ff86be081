//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for desktop and server
//! hosts (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `EntityStore` using SQLite through `sqlx` (JSON attributes, guarded upserts)
//! - `ObjectStore` using `tokio::fs` under a root directory
//! - `KeyValueCache` using an in-process `lru` cache with per-entry expiry
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FsObjectStore, InMemoryCache, ReqwestHttpClient, SqliteEntityStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http = ReqwestHttpClient::new()?;
//!     let entities = SqliteEntityStore::new("data/photos.db".into()).await?;
//!     let objects = FsObjectStore::new("data/objects", "http://localhost:9000/photos");
//!     let cache = InMemoryCache::new(1024);
//!     // hand them to the sync service
//!     Ok(())
//! }
//! ```

mod cache;
mod entity_store;
mod http;
mod object_store;

pub use cache::InMemoryCache;
pub use entity_store::SqliteEntityStore;
pub use http::ReqwestHttpClient;
pub use object_store::FsObjectStore;
