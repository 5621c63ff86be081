//! Lightroom REST API connector
//!
//! Typed client for the account, catalog, album, asset and rendition
//! resources, with retry/backoff on throttling and server errors.

use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bytes::Bytes;
use core_runtime::config::{SyncEngineConfig, DEFAULT_API_BASE_URL};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::catalog::PhotoCatalog;
use crate::error::{LightroomError, Result};
use crate::pagination::collect_all;
use crate::types::{
    Account, Album, AssetMetadata, Catalog, Page, RemoteAsset, Rendition, RenditionSize,
};

/// Connection settings shared by every client a factory hands out.
#[derive(Debug, Clone)]
pub struct CatalogClientConfig {
    /// Base URL ending in `/`; relative hrefs resolve against it
    pub api_base: Url,
    /// Sent as `X-API-Key`; the OAuth client id
    pub api_key: String,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub retry: RetryPolicy,
    pub page_size: u32,
    pub max_pages: usize,
}

impl CatalogClientConfig {
    pub fn new(api_base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let normalized = format!("{}/", api_base_url.trim_end_matches('/'));
        let api_base = Url::parse(&normalized).map_err(|e| {
            LightroomError::Bridge(BridgeError::InvalidInput(format!(
                "Invalid API base URL {:?}: {}",
                api_base_url, e
            )))
        })?;

        Ok(Self {
            api_base,
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            page_size: 100,
            max_pages: 10_000,
        })
    }

    pub fn lightroom(api_key: impl Into<String>) -> Result<Self> {
        Self::new(DEFAULT_API_BASE_URL, api_key)
    }

    pub fn from_engine_config(config: &SyncEngineConfig) -> Result<Self> {
        let mut client = Self::new(&config.provider.api_base_url, config.provider.client_id.clone())?;
        client.request_timeout = config.request_timeout;
        client.download_timeout = config.download_timeout;
        client.retry = RetryPolicy::default().with_max_attempts(config.max_retries);
        client.page_size = config.page_size;
        client.max_pages = config.max_pages;
        Ok(client)
    }
}

/// Client bound to one access token.
///
/// Authentication headers are fixed at construction; a new token means a
/// new client.
///
/// # Example
///
/// ```ignore
/// use provider_lightroom::{CatalogClient, CatalogClientConfig};
///
/// let client = CatalogClient::new(http_client, &tokens.access_token, config);
/// let catalog = client.get_catalog().await?;
/// let albums = client.get_all_albums(&catalog.id).await?;
/// client.close();
/// ```
pub struct CatalogClient {
    http_client: Mutex<Option<Arc<dyn HttpClient>>>,
    headers: HashMap<String, String>,
    config: CatalogClientConfig,
}

impl CatalogClient {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        access_token: &str,
        config: CatalogClientConfig,
    ) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", access_token));
        headers.insert("X-API-Key".to_string(), config.api_key.clone());
        headers.insert("Accept".to_string(), "application/json".to_string());

        Self {
            http_client: Mutex::new(Some(http_client)),
            headers,
            config,
        }
    }

    /// Release the HTTP client handle. Idempotent; later calls fail with
    /// [`LightroomError::Closed`].
    pub fn close(&self) {
        let released = self
            .http_client
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if released.is_some() {
            debug!("Catalog client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.http_client
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_none()
    }

    pub fn page_size(&self) -> u32 {
        self.config.page_size
    }

    fn http(&self) -> Result<Arc<dyn HttpClient>> {
        self.http_client
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or(LightroomError::Closed)
    }

    /// Resolve a path or href against the API base. Absolute URLs pass
    /// through; `/`-prefixed hrefs resolve against the host.
    pub fn resolve(&self, href: &str) -> Result<String> {
        self.config
            .api_base
            .join(href)
            .map(String::from)
            .map_err(|e| LightroomError::Decode(format!("Invalid href {:?}: {}", href, e)))
    }

    fn collection_url(&self, path: &str, limit: u32, after: Option<&str>) -> Result<String> {
        let mut url = format!("{}?limit={}", self.resolve(path)?, limit);
        if let Some(after) = after {
            url.push_str(&format!("&after={}", urlencoding::encode(after)));
        }
        Ok(url)
    }

    /// GET with retry on 429/5xx and transport failures.
    #[instrument(skip(self))]
    async fn get_with_retry(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        let policy = &self.config.retry;
        let mut attempt = 0;

        loop {
            let http = self.http()?;
            let request = HttpRequest::new(HttpMethod::Get, url)
                .headers(&self.headers)
                .timeout(timeout);

            let failure = match http.execute(request).await {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "API request succeeded");
                    return Ok(response);
                }
                Ok(response) if !response.is_retryable() => {
                    warn!(status = response.status, "API request failed");
                    return Err(LightroomError::Api {
                        status: response.status,
                        body: response.text_lossy(),
                    });
                }
                Ok(response) => LightroomError::Api {
                    status: response.status,
                    body: response.text_lossy(),
                },
                Err(e) => LightroomError::Network(e.to_string()),
            };

            attempt += 1;
            if attempt >= policy.max_attempts {
                warn!(attempts = attempt, error = %failure, "API request failed, giving up");
                return Err(failure);
            }

            let delay = policy.delay_for(attempt - 1);
            warn!(
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "API request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, resource: &str) -> Result<T> {
        let response = self.get_with_retry(url, self.config.request_timeout).await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| LightroomError::Decode(format!("{}: {}", resource, e)))
    }

    #[instrument(skip(self))]
    pub async fn get_account(&self) -> Result<Account> {
        let url = self.resolve("account")?;
        self.get_json(&url, "account").await
    }

    #[instrument(skip(self))]
    pub async fn get_catalog(&self) -> Result<Catalog> {
        let url = self.resolve("catalog")?;
        let catalog: Catalog = self.get_json(&url, "catalog").await?;
        info!(catalog_id = %catalog.id, "Fetched catalog");
        Ok(catalog)
    }

    #[instrument(skip(self))]
    pub async fn get_albums(
        &self,
        catalog_id: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Page<Album>> {
        let path = format!("catalogs/{}/albums", urlencoding::encode(catalog_id));
        let url = self.collection_url(&path, limit, after)?;
        self.get_json(&url, "album page").await
    }

    #[instrument(skip(self))]
    pub async fn get_album_assets(
        &self,
        catalog_id: &str,
        album_id: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Page<RemoteAsset>> {
        let path = format!(
            "catalogs/{}/albums/{}/assets",
            urlencoding::encode(catalog_id),
            urlencoding::encode(album_id)
        );
        let url = self.collection_url(&path, limit, after)?;
        self.get_json(&url, "album asset page").await
    }

    /// Every album in the catalog, following the cursor chain.
    #[instrument(skip(self))]
    pub async fn get_all_albums(&self, catalog_id: &str) -> Result<Vec<Album>> {
        let limit = self.config.page_size;
        let albums = collect_all(self.config.max_pages, |after| async move {
            self.get_albums(catalog_id, limit, after.as_deref()).await
        })
        .await?;

        info!(count = albums.len(), "Retrieved albums from catalog");
        Ok(albums)
    }

    /// Every asset in the album, in provider order.
    #[instrument(skip(self))]
    pub async fn get_all_assets(&self, catalog_id: &str, album_id: &str) -> Result<Vec<RemoteAsset>> {
        let limit = self.config.page_size;
        let assets = collect_all(self.config.max_pages, |after| async move {
            self.get_album_assets(catalog_id, album_id, limit, after.as_deref())
                .await
        })
        .await?;

        info!(count = assets.len(), album_id, "Retrieved assets from album");
        Ok(assets)
    }

    #[instrument(skip(self))]
    pub async fn get_asset(&self, catalog_id: &str, asset_id: &str) -> Result<RemoteAsset> {
        let url = self.resolve(&format!(
            "catalogs/{}/assets/{}",
            urlencoding::encode(catalog_id),
            urlencoding::encode(asset_id)
        ))?;
        self.get_json(&url, "asset").await
    }

    #[instrument(skip(self))]
    pub async fn get_asset_metadata(
        &self,
        catalog_id: &str,
        asset_id: &str,
    ) -> Result<AssetMetadata> {
        let url = self.resolve(&format!(
            "catalogs/{}/assets/{}/metadata",
            urlencoding::encode(catalog_id),
            urlencoding::encode(asset_id)
        ))?;
        self.get_json(&url, "asset metadata").await
    }

    /// Absolute download URL for one rendition tier.
    #[instrument(skip(self))]
    pub async fn get_asset_rendition(
        &self,
        catalog_id: &str,
        asset_id: &str,
        size: RenditionSize,
    ) -> Result<String> {
        let url = self.resolve(&format!(
            "catalogs/{}/assets/{}/renditions/{}",
            urlencoding::encode(catalog_id),
            urlencoding::encode(asset_id),
            size.as_str()
        ))?;
        let rendition: Rendition = self.get_json(&url, "rendition").await?;
        self.resolve(&rendition.href)
    }

    /// Download rendition bytes with the longer download timeout.
    #[instrument(skip(self, url))]
    pub async fn download_rendition(&self, url: &str) -> Result<Bytes> {
        let url = self.resolve(url)?;
        let response = self
            .get_with_retry(&url, self.config.download_timeout)
            .await?;
        debug!(bytes = response.body.len(), "Downloaded rendition");
        Ok(response.body)
    }
}

#[async_trait]
impl PhotoCatalog for CatalogClient {
    async fn list_album_assets(&self, catalog_id: &str, album_id: &str) -> Result<Vec<RemoteAsset>> {
        self.get_all_assets(catalog_id, album_id).await
    }

    async fn get_asset_metadata(&self, catalog_id: &str, asset_id: &str) -> Result<AssetMetadata> {
        CatalogClient::get_asset_metadata(self, catalog_id, asset_id).await
    }

    async fn get_rendition_url(
        &self,
        catalog_id: &str,
        asset_id: &str,
        size: RenditionSize,
    ) -> Result<String> {
        self.get_asset_rendition(catalog_id, asset_id, size).await
    }

    async fn download_rendition(&self, url: &str) -> Result<Bytes> {
        CatalogClient::download_rendition(self, url).await
    }
}
