//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, entity
//! store, object store, cache) into the photo sync engine and exposes the
//! caller-facing [`PhotoSyncService`]. Desktop and server hosts typically
//! enable the `desktop-shims` feature (which depends on `bridge-desktop`)
//! and call [`bootstrap_desktop`].

pub mod error;
pub mod service;

pub use error::{Result, ServiceError};
pub use service::{AlbumAsset, AssetDetails, PhotoSyncService, RemoteAlbums};

use std::sync::Arc;

use bridge_traits::{
    entity::EntityStore,
    http::HttpClient,
    storage::{KeyValueCache, ObjectStore},
};

/// Aggregated handle to all bridge dependencies the engine requires.
#[derive(Clone)]
pub struct ServiceDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub entity_store: Arc<dyn EntityStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub cache: Arc<dyn KeyValueCache>,
}

impl ServiceDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        entity_store: Arc<dyn EntityStore>,
        object_store: Arc<dyn ObjectStore>,
        cache: Arc<dyn KeyValueCache>,
    ) -> Self {
        Self {
            http_client,
            entity_store,
            object_store,
            cache,
        }
    }
}

/// Convenience bootstrapper for desktop and server hosts.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_runtime::config::SyncEngineConfig;
///
/// let config = SyncEngineConfig::from_env()?;
/// let service = core_service::bootstrap_desktop(&config).await?;
/// let status = service.auth_status().await?;
/// # Ok(())
/// # }
/// ```
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub async fn bootstrap_desktop(
    config: &core_runtime::config::SyncEngineConfig,
) -> Result<PhotoSyncService> {
    use bridge_desktop::{FsObjectStore, InMemoryCache, ReqwestHttpClient, SqliteEntityStore};

    let http_client = ReqwestHttpClient::with_timeout(config.download_timeout)
        .map_err(|e| ServiceError::InitializationFailed(e.to_string()))?;
    let entity_store = SqliteEntityStore::new(config.storage.database_path.clone())
        .await
        .map_err(|e| ServiceError::InitializationFailed(e.to_string()))?;
    let object_store = FsObjectStore::new(
        config.storage.object_store_dir.clone(),
        config.storage.object_base_url.clone(),
    );
    let cache = InMemoryCache::new(config.storage.cache_capacity);

    tracing::info!(
        database = ?config.storage.database_path,
        objects = ?config.storage.object_store_dir,
        "Bootstrapping desktop photo sync service"
    );

    let deps = ServiceDependencies::new(
        Arc::new(http_client),
        Arc::new(entity_store),
        Arc::new(object_store),
        Arc::new(cache),
    );
    PhotoSyncService::new(config, deps, core_runtime::events::EventBus::default())
}
