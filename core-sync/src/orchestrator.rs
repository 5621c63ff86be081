//! # Sync Orchestrator
//!
//! Ingests albums from a remote photo catalog into the object store and the
//! entity store.
//!
//! ## Workflow
//!
//! ### Album
//! 1. Enumerate every asset in the album (full pagination)
//! 2. Sync each asset; failures are counted and the loop continues
//! 3. Persist a [`SyncReport`] as a `SyncLog` node and emit an event
//!
//! ### Asset
//! 1. Atomically claim the asset; a lost claim means "skip"
//! 2. Fetch metadata and the thumbnail rendition
//! 3. Store the thumbnail under `thumbnails/{asset_id}.jpg`
//! 4. Persist the normalized record, its Album and the `IN_ALBUM` edge
//! 5. Cache the rendition URLs for 24 hours
//!
//! The claim write is the only dedup mechanism. Syncs of the same album are
//! additionally serialized through a per-album lock.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = SyncOrchestrator::new(repository, objects, cache, OrchestratorConfig::default());
//! let client = factory.for_tokens(&tokens);
//! let report = orchestrator.sync_album(&client, &catalog.id, "alb-1", "Reef Trip").await;
//! println!("{} new, {} skipped, {} errors", report.new_assets, report.skipped_assets, report.errors);
//! ```

use bridge_traits::storage::{get_json, set_json, KeyValueCache, ObjectStore};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::config::SyncEngineConfig;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use provider_lightroom::{PhotoCatalog, RemoteAsset, RenditionSize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::metadata_processor::{AlbumContext, MetadataProcessor};
use crate::models::{AssetRecord, IdentificationAsset, RenditionBundle, SyncReport, SyncedAlbum};
use crate::repository::AssetRepository;

const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Prefix for rendition cache keys
    pub cache_namespace: String,

    /// Lifetime of a cached rendition bundle
    pub rendition_cache_ttl: Duration,

    /// How long a claim blocks other writers before it may be taken over
    pub claim_lease: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_namespace: "lightroom".to_string(),
            rendition_cache_ttl: Duration::from_secs(24 * 3600),
            claim_lease: Duration::from_secs(15 * 60),
        }
    }
}

impl From<&SyncEngineConfig> for OrchestratorConfig {
    fn from(config: &SyncEngineConfig) -> Self {
        Self {
            cache_namespace: config.cache_namespace.clone(),
            rendition_cache_ttl: config.rendition_cache_ttl,
            claim_lease: config.claim_lease,
        }
    }
}

pub fn thumbnail_key(asset_id: &str) -> String {
    format!("thumbnails/{}.jpg", asset_id)
}

pub fn identification_key(asset_id: &str) -> String {
    format!("identification/{}_2048.jpg", asset_id)
}

pub struct SyncOrchestrator {
    repository: Arc<dyn AssetRepository>,
    objects: Arc<dyn ObjectStore>,
    cache: Arc<dyn KeyValueCache>,
    config: OrchestratorConfig,
    processor: MetadataProcessor,
    event_bus: Option<EventBus>,
    clock: Arc<dyn Clock>,
    album_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SyncOrchestrator {
    pub fn new(
        repository: Arc<dyn AssetRepository>,
        objects: Arc<dyn ObjectStore>,
        cache: Arc<dyn KeyValueCache>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            repository,
            objects,
            cache,
            config,
            processor: MetadataProcessor::new(),
            event_bus: None,
            clock: Arc::new(SystemClock),
            album_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn rendition_cache_key(&self, asset_id: &str) -> String {
        format!("{}:renditions:{}", self.config.cache_namespace, asset_id)
    }

    /// Sync every asset of an album. Never fails: album-level problems are
    /// recorded in [`SyncReport::error_message`].
    pub async fn sync_album(
        &self,
        catalog: &dyn PhotoCatalog,
        catalog_id: &str,
        album_id: &str,
        album_name: &str,
    ) -> SyncReport {
        self.sync_album_with_cancellation(
            catalog,
            catalog_id,
            album_id,
            album_name,
            &CancellationToken::new(),
        )
        .await
    }

    /// As [`sync_album`](Self::sync_album), stopping between assets once
    /// `cancel` fires. A cancelled report is still persisted and returned.
    #[instrument(skip(self, catalog, cancel))]
    pub async fn sync_album_with_cancellation(
        &self,
        catalog: &dyn PhotoCatalog,
        catalog_id: &str,
        album_id: &str,
        album_name: &str,
        cancel: &CancellationToken,
    ) -> SyncReport {
        let lock = self.album_lock(album_id);
        let _guard = lock.lock().await;

        info!("Starting album sync");
        let mut report = SyncReport::new(album_id, album_name, self.clock.now());
        self.emit(SyncEvent::Started {
            album_id: album_id.to_string(),
            album_name: album_name.to_string(),
        });

        let listing = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            result = catalog.list_album_assets(catalog_id, album_id) => result.map_err(SyncError::from),
        };

        match listing {
            Ok(assets) => {
                report.total_assets = assets.len() as u64;
                for asset in &assets {
                    if cancel.is_cancelled() {
                        warn!(
                            processed = report.new_assets + report.skipped_assets + report.errors,
                            "Album sync cancelled"
                        );
                        report.error_message = Some(SyncError::Cancelled.to_string());
                        break;
                    }

                    match self
                        .sync_asset(catalog, catalog_id, asset, album_id, album_name)
                        .await
                    {
                        Ok(true) => report.new_assets += 1,
                        Ok(false) => report.skipped_assets += 1,
                        Err(e) => {
                            error!(asset_id = %asset.id, error = %e, "Asset sync failed");
                            report.errors += 1;
                            self.emit(SyncEvent::AssetFailed {
                                album_id: album_id.to_string(),
                                asset_id: asset.id.clone(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to enumerate album assets");
                report.error_message = Some(e.to_string());
            }
        }

        report.end_time = Some(self.clock.now());

        if let Err(e) = self.repository.append_sync_log(&report).await {
            warn!(error = %e, "Failed to persist sync log");
        }

        match &report.error_message {
            Some(message) => self.emit(SyncEvent::Failed {
                album_id: album_id.to_string(),
                message: message.clone(),
            }),
            None => self.emit(SyncEvent::Completed {
                album_id: album_id.to_string(),
                total_assets: report.total_assets,
                new_assets: report.new_assets,
                skipped_assets: report.skipped_assets,
                errors: report.errors,
            }),
        }

        info!(
            total = report.total_assets,
            new = report.new_assets,
            skipped = report.skipped_assets,
            errors = report.errors,
            duration_ms = report.duration_ms().unwrap_or_default(),
            "Album sync finished"
        );
        report
    }

    /// Record an album sync that failed before enumeration could start.
    ///
    /// The report is persisted and announced like any other failed sync.
    pub async fn record_failed_sync(
        &self,
        album_id: &str,
        album_name: &str,
        message: String,
    ) -> SyncReport {
        let now = self.clock.now();
        let mut report = SyncReport::new(album_id, album_name, now);
        report.end_time = Some(now);
        report.error_message = Some(message.clone());

        if let Err(e) = self.repository.append_sync_log(&report).await {
            warn!(error = %e, "Failed to persist sync log");
        }
        self.emit(SyncEvent::Failed {
            album_id: album_id.to_string(),
            message,
        });
        report
    }

    /// Ingest one asset. `Ok(false)` means another sync already owns or
    /// finished it.
    #[instrument(skip(self, catalog, asset), fields(asset_id = %asset.id))]
    pub async fn sync_asset(
        &self,
        catalog: &dyn PhotoCatalog,
        catalog_id: &str,
        asset: &RemoteAsset,
        album_id: &str,
        album_name: &str,
    ) -> Result<bool> {
        let now = self.clock.now();
        let lease_until = now + lease_duration(self.config.claim_lease);

        let claimed = self
            .repository
            .claim_asset(&asset.id, now, lease_until)
            .await
            .map_err(|e| SyncError::asset(&asset.id, e))?;
        if !claimed {
            debug!("Asset already synced or claimed, skipping");
            return Ok(false);
        }

        let context = AlbumContext {
            catalog_id,
            album_id,
            album_name,
        };

        match self.ingest(catalog, context, asset).await {
            Ok(()) => {
                info!("Synced asset");
                Ok(true)
            }
            Err(e) => {
                if let Err(release) = self.repository.mark_failed(&asset.id).await {
                    warn!(error = %release, "Failed to release claim");
                }
                Err(SyncError::asset(&asset.id, e))
            }
        }
    }

    async fn ingest(
        &self,
        catalog: &dyn PhotoCatalog,
        context: AlbumContext<'_>,
        asset: &RemoteAsset,
    ) -> Result<()> {
        let metadata = catalog
            .get_asset_metadata(context.catalog_id, &asset.id)
            .await?;

        let thumbnail_url = catalog
            .get_rendition_url(context.catalog_id, &asset.id, RenditionSize::Thumbnail2x)
            .await?;
        let thumbnail = catalog.download_rendition(&thumbnail_url).await?;

        let key = thumbnail_key(&asset.id);
        let stored = self.objects.put(&key, thumbnail, IMAGE_CONTENT_TYPE).await?;
        debug!(key = %stored.key, size = stored.size, "Stored thumbnail");

        let record = self
            .processor
            .normalize(context, asset, &metadata, &key, self.clock.now());
        self.repository.save_asset(&record).await?;

        let bundle = RenditionBundle::with_thumbnail(thumbnail_url);
        if let Err(e) = set_json(
            self.cache.as_ref(),
            &self.rendition_cache_key(&asset.id),
            &bundle,
            self.config.rendition_cache_ttl,
        )
        .await
        {
            warn!(error = %e, "Failed to cache rendition URLs");
        }

        Ok(())
    }

    /// Albums with synced assets, ordered by name.
    pub async fn get_synced_albums(&self) -> Result<Vec<SyncedAlbum>> {
        self.repository.list_synced_albums().await
    }

    /// Synced assets of an album, newest capture date first.
    pub async fn get_album_assets(&self, album_id: &str) -> Result<Vec<AssetRecord>> {
        self.repository.list_album_assets(album_id).await
    }

    /// Load a synced asset with its 2048px rendition, stored under
    /// `identification/{asset_id}_2048.jpg`. `None` when the asset was never
    /// synced.
    #[instrument(skip(self, catalog))]
    pub async fn get_asset_for_identification(
        &self,
        catalog: &dyn PhotoCatalog,
        asset_id: &str,
    ) -> Result<Option<IdentificationAsset>> {
        let Some(asset) = self.repository.find_asset(asset_id).await? else {
            debug!("Asset not found");
            return Ok(None);
        };

        let url = self
            .rendition_url(catalog, &asset.catalog_id, asset_id, RenditionSize::Px2048)
            .await?;
        let image_data = catalog.download_rendition(&url).await?;

        let image_key = identification_key(asset_id);
        self.objects
            .put(&image_key, image_data.clone(), IMAGE_CONTENT_TYPE)
            .await?;

        info!(bytes = image_data.len(), "Fetched identification image");
        Ok(Some(IdentificationAsset {
            asset,
            image_data,
            image_key,
        }))
    }

    /// Rendition URL from the cached bundle, re-fetched from the provider and
    /// written back when the bundle or the tier is missing.
    async fn rendition_url(
        &self,
        catalog: &dyn PhotoCatalog,
        catalog_id: &str,
        asset_id: &str,
        size: RenditionSize,
    ) -> Result<String> {
        let cache_key = self.rendition_cache_key(asset_id);
        let cached: Option<RenditionBundle> = match get_json(self.cache.as_ref(), &cache_key).await
        {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable rendition bundle");
                None
            }
        };

        if let Some(url) = cached.as_ref().and_then(|b| b.get(size)) {
            debug!(%size, "Rendition URL from cache");
            return Ok(url.to_string());
        }

        debug!(%size, "Rendition URL not cached, fetching");
        let url = catalog.get_rendition_url(catalog_id, asset_id, size).await?;

        let mut bundle = cached.unwrap_or_default();
        bundle.set(size, url.clone());
        if let Err(e) = set_json(
            self.cache.as_ref(),
            &cache_key,
            &bundle,
            self.config.rendition_cache_ttl,
        )
        .await
        {
            warn!(error = %e, "Failed to cache rendition URLs");
        }

        Ok(url)
    }

    fn album_lock(&self, album_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .album_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(album_id.to_string()).or_default())
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Sync(event));
        }
    }
}

fn lease_duration(lease: Duration) -> chrono::Duration {
    chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::minutes(15))
}
