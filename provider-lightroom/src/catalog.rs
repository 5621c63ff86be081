use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::types::{AssetMetadata, RemoteAsset, RenditionSize};

/// Read access to a remote photo catalog, as consumed by the sync engine.
///
/// [`CatalogClient`](crate::CatalogClient) is the production implementation;
/// tests substitute scripted catalogs.
#[async_trait]
pub trait PhotoCatalog: Send + Sync {
    /// Every asset in an album, across all pages, in provider order.
    async fn list_album_assets(&self, catalog_id: &str, album_id: &str) -> Result<Vec<RemoteAsset>>;

    async fn get_asset_metadata(&self, catalog_id: &str, asset_id: &str) -> Result<AssetMetadata>;

    /// Absolute URL of the requested rendition tier.
    async fn get_rendition_url(
        &self,
        catalog_id: &str,
        asset_id: &str,
        size: RenditionSize,
    ) -> Result<String>;

    async fn download_rendition(&self, url: &str) -> Result<Bytes>;
}
