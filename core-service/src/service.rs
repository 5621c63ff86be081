//! Caller-facing photo sync operations.

use bridge_traits::storage::ObjectStore;
use core_auth::{
    AuthManager, AuthStatus, AuthorizationRequest, CachePendingAuthStore, OAuthConfig,
    OAuthFlowManager, TokenCache,
};
use core_runtime::config::SyncEngineConfig;
use core_runtime::events::{CoreEvent, EventBus};
use core_sync::{
    AssetRecord, CancellationToken, GraphAssetRepository, OrchestratorConfig, SyncOrchestrator,
    SyncReport, SyncedAlbum,
};
use provider_lightroom::{Album, Catalog, CatalogClient, CatalogClientConfig, CatalogClientFactory};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::ServiceDependencies;

/// Albums of the user's catalog as listed by the provider.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteAlbums {
    pub catalog_id: String,
    pub albums: Vec<Album>,
}

/// A synced asset with the public URL of its thumbnail.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumAsset {
    #[serde(flatten)]
    pub asset: AssetRecord,
    pub thumbnail_url: String,
}

/// Asset detail view. The identification image itself is stored, not
/// returned.
#[derive(Debug, Clone, Serialize)]
pub struct AssetDetails {
    #[serde(flatten)]
    pub asset: AssetRecord,
    pub image_key: String,
    pub image_size: u64,
    pub image_url: String,
}

/// Photo sync façade: authorization, remote browsing, album sync and reads
/// of synced data.
pub struct PhotoSyncService {
    auth: AuthManager,
    clients: CatalogClientFactory,
    orchestrator: SyncOrchestrator,
    objects: Arc<dyn ObjectStore>,
    event_bus: EventBus,
}

impl PhotoSyncService {
    pub fn new(
        config: &SyncEngineConfig,
        deps: ServiceDependencies,
        event_bus: EventBus,
    ) -> Result<Self> {
        let namespace = config.cache_namespace.clone();

        let auth = AuthManager::new(
            OAuthFlowManager::new(OAuthConfig::from(config), Arc::clone(&deps.http_client)),
            Arc::new(CachePendingAuthStore::new(
                Arc::clone(&deps.cache),
                namespace.clone(),
                config.pending_auth_ttl,
            )),
            TokenCache::new(
                Arc::clone(&deps.cache),
                namespace,
                config.token_cache_ttl,
                config.refresh_token_ttl,
            ),
            event_bus.clone(),
        );

        let clients = CatalogClientFactory::new(
            Arc::clone(&deps.http_client),
            CatalogClientConfig::from_engine_config(config)?,
        );

        let orchestrator = SyncOrchestrator::new(
            Arc::new(GraphAssetRepository::new(Arc::clone(&deps.entity_store))),
            Arc::clone(&deps.object_store),
            Arc::clone(&deps.cache),
            OrchestratorConfig::from(config),
        )
        .with_event_bus(event_bus.clone());

        Ok(Self {
            auth,
            clients,
            orchestrator,
            objects: deps.object_store,
            event_bus,
        })
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub async fn initiate_auth(&self) -> Result<AuthorizationRequest> {
        Ok(self.auth.begin_authorization().await?)
    }

    /// Redeem the authorization callback parameters.
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<AuthStatus> {
        let tokens = self.auth.complete_authorization(code, state).await?;
        Ok(AuthStatus::connected(tokens.account_id))
    }

    pub async fn auth_status(&self) -> Result<AuthStatus> {
        Ok(self.auth.status().await?)
    }

    pub async fn disconnect(&self) -> Result<()> {
        Ok(self.auth.disconnect().await?)
    }

    async fn client(&self) -> Result<CatalogClient> {
        let tokens = self.auth.valid_token().await?;
        Ok(self.clients.for_tokens(&tokens))
    }

    pub async fn get_catalog(&self) -> Result<Catalog> {
        let client = self.client().await?;
        let catalog = client.get_catalog().await;
        client.close();
        Ok(catalog?)
    }

    #[instrument(skip(self))]
    pub async fn list_remote_albums(&self) -> Result<RemoteAlbums> {
        let client = self.client().await?;
        let result = async {
            let catalog = client.get_catalog().await?;
            let albums = client.get_all_albums(&catalog.id).await?;
            Ok::<_, provider_lightroom::LightroomError>(RemoteAlbums {
                catalog_id: catalog.id,
                albums,
            })
        }
        .await;
        client.close();
        Ok(result?)
    }

    pub async fn sync_album(&self, album_id: &str, album_name: &str) -> Result<SyncReport> {
        self.sync_album_with_cancellation(album_id, album_name, &CancellationToken::new())
            .await
    }

    /// Sync one album into local storage.
    ///
    /// Fails only when no credentials are available; everything else,
    /// including a failed catalog lookup, is reported in the returned and
    /// persisted [`SyncReport`].
    #[instrument(skip(self, cancel))]
    pub async fn sync_album_with_cancellation(
        &self,
        album_id: &str,
        album_name: &str,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let client = self.client().await?;

        let report = match client.get_catalog().await {
            Ok(catalog) => {
                self.orchestrator
                    .sync_album_with_cancellation(&client, &catalog.id, album_id, album_name, cancel)
                    .await
            }
            Err(e) => {
                warn!(error = %e, "Catalog lookup failed, album not synced");
                self.orchestrator
                    .record_failed_sync(album_id, album_name, e.to_string())
                    .await
            }
        };

        client.close();
        info!(
            new = report.new_assets,
            skipped = report.skipped_assets,
            errors = report.errors,
            "Album sync request finished"
        );
        Ok(report)
    }

    pub async fn list_synced_albums(&self) -> Result<Vec<SyncedAlbum>> {
        Ok(self.orchestrator.get_synced_albums().await?)
    }

    pub async fn list_album_assets(&self, album_id: &str) -> Result<Vec<AlbumAsset>> {
        let assets = self.orchestrator.get_album_assets(album_id).await?;
        Ok(assets
            .into_iter()
            .map(|asset| AlbumAsset {
                thumbnail_url: self.objects.url_for(&asset.thumbnail_key),
                asset,
            })
            .collect())
    }

    /// Synced asset with a freshly fetched identification image. `None` when
    /// the asset was never synced.
    #[instrument(skip(self))]
    pub async fn get_asset_details(&self, asset_id: &str) -> Result<Option<AssetDetails>> {
        let client = self.client().await?;
        let found = self
            .orchestrator
            .get_asset_for_identification(&client, asset_id)
            .await;
        client.close();

        Ok(found?.map(|found| AssetDetails {
            image_size: found.image_data.len() as u64,
            image_url: self.objects.url_for(&found.image_key),
            image_key: found.image_key,
            asset: found.asset,
        }))
    }
}
