//! # Engine Configuration
//!
//! Settings for the photo-sync engine: the OAuth provider registration and
//! endpoints, HTTP timeouts and retry budget, pagination limits, cache
//! lifetimes and the locations of the desktop storage adapters.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{ProviderSettings, SyncEngineConfig};
//!
//! let config = SyncEngineConfig::builder()
//!     .provider(ProviderSettings::lightroom(
//!         "client-id",
//!         Some("client-secret".into()),
//!         "https://localhost:8000/api/v1/lightroom/auth/callback",
//!     ))
//!     .database_path("/var/lib/photo-sync/photos.db")
//!     .build()?;
//! ```
//!
//! Or from the process environment:
//!
//! ```ignore
//! let config = SyncEngineConfig::from_env()?;
//! ```
//!
//! `build()` validates eagerly and returns [`Error::Config`] with the
//! offending setting named.

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_AUTH_URL: &str = "https://ims-na1.adobelogin.com/ims/authorize/v2";
pub const DEFAULT_TOKEN_URL: &str = "https://ims-na1.adobelogin.com/ims/token/v3";
pub const DEFAULT_API_BASE_URL: &str = "https://lr.adobe.io/v2/";
pub const DEFAULT_REDIRECT_URI: &str = "https://localhost:8000/api/v1/lightroom/auth/callback";
pub const DEFAULT_SCOPES: [&str; 4] = [
    "openid",
    "creative_sdk",
    "lr_partner_apis",
    "lr_partner_apis_ro",
];

const ENV_CLIENT_ID: &str = "LIGHTROOM_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "LIGHTROOM_CLIENT_SECRET";
const ENV_REDIRECT_URI: &str = "LIGHTROOM_REDIRECT_URI";
const ENV_DATABASE_PATH: &str = "PHOTO_SYNC_DATABASE_PATH";
const ENV_OBJECT_DIR: &str = "PHOTO_SYNC_OBJECT_DIR";
const ENV_OBJECT_BASE_URL: &str = "PHOTO_SYNC_OBJECT_BASE_URL";
const ENV_CACHE_NAMESPACE: &str = "PHOTO_SYNC_CACHE_NAMESPACE";

/// OAuth registration and endpoints of the remote photo service.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    /// Endpoint used to check whether an access token is still accepted.
    pub validation_url: String,
    pub api_base_url: String,
    pub scopes: Vec<String>,
}

impl ProviderSettings {
    /// Adobe Lightroom endpoints with the given client registration.
    pub fn lightroom(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            revoke_url: format!("{}/revoke", DEFAULT_TOKEN_URL),
            validation_url: format!("{}account", DEFAULT_API_BASE_URL),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Point every endpoint at a different host, keeping the paths.
    ///
    /// Used to run the engine against a local stand-in of the service.
    pub fn with_endpoints(mut self, identity_base: &str, api_base: &str) -> Self {
        let identity_base = identity_base.trim_end_matches('/');
        let api_base = format!("{}/", api_base.trim_end_matches('/'));
        self.auth_url = format!("{}/ims/authorize/v2", identity_base);
        self.token_url = format!("{}/ims/token/v3", identity_base);
        self.revoke_url = format!("{}/ims/token/v3/revoke", identity_base);
        self.validation_url = format!("{}account", api_base);
        self.api_base_url = api_base;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("Client ID cannot be empty".to_string()));
        }

        for (name, value) in [
            ("redirect_uri", &self.redirect_uri),
            ("auth_url", &self.auth_url),
            ("token_url", &self.token_url),
            ("revoke_url", &self.revoke_url),
            ("validation_url", &self.validation_url),
            ("api_base_url", &self.api_base_url),
        ] {
            if !(value.starts_with("https://") || value.starts_with("http://")) {
                return Err(Error::Config(format!(
                    "{} must be an absolute http(s) URL, got {:?}",
                    name, value
                )));
            }
        }

        if self.scopes.is_empty() {
            return Err(Error::Config("At least one OAuth scope is required".to_string()));
        }

        Ok(())
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("api_base_url", &self.api_base_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Locations used by the desktop storage adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub database_path: PathBuf,
    pub object_store_dir: PathBuf,
    /// Public base URL under which stored objects are served.
    pub object_base_url: String,
    /// Maximum number of entries in the in-process cache.
    pub cache_capacity: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/photo-sync.db"),
            object_store_dir: PathBuf::from("data/objects"),
            object_base_url: "http://localhost:9000/photos".to_string(),
            cache_capacity: 10_000,
        }
    }
}

/// Complete engine configuration. Build with [`SyncEngineConfig::builder`].
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    pub provider: ProviderSettings,
    pub storage: StorageSettings,

    /// Timeout for a single API call
    pub request_timeout: Duration,
    /// Timeout for a single rendition download
    pub download_timeout: Duration,
    /// Attempts per API call, including the first
    pub max_retries: u32,
    /// Items requested per listing page
    pub page_size: u32,
    /// Hard cap on pages followed in one listing
    pub max_pages: usize,

    /// How long an issued authorization URL stays redeemable
    pub pending_auth_ttl: Duration,
    /// Lifetime of the cached token set
    pub token_cache_ttl: Duration,
    /// Lifetime of the cached refresh token
    pub refresh_token_ttl: Duration,
    /// Lifetime of cached rendition URL bundles
    pub rendition_cache_ttl: Duration,
    /// How long an in-flight asset claim blocks other writers
    pub claim_lease: Duration,

    /// Prefix for every cache key written by the engine
    pub cache_namespace: String,
}

impl SyncEngineConfig {
    pub fn builder() -> SyncEngineConfigBuilder {
        SyncEngineConfigBuilder::default()
    }

    /// Load configuration from the process environment.
    ///
    /// `LIGHTROOM_CLIENT_ID` is required; everything else falls back to
    /// defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = lookup(ENV_CLIENT_ID)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::MissingEnv(ENV_CLIENT_ID.to_string()))?;
        let client_secret = lookup(ENV_CLIENT_SECRET).filter(|v| !v.is_empty());
        let redirect_uri =
            lookup(ENV_REDIRECT_URI).unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

        let mut builder = Self::builder().provider(ProviderSettings::lightroom(
            client_id,
            client_secret,
            redirect_uri,
        ));

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            builder = builder.database_path(path);
        }
        if let Some(dir) = lookup(ENV_OBJECT_DIR) {
            builder = builder.object_store_dir(dir);
        }
        if let Some(url) = lookup(ENV_OBJECT_BASE_URL) {
            builder = builder.object_base_url(url);
        }
        if let Some(namespace) = lookup(ENV_CACHE_NAMESPACE) {
            builder = builder.cache_namespace(namespace);
        }

        builder.build()
    }

    pub fn validate(&self) -> Result<()> {
        self.provider.validate()?;

        for (name, value) in [
            ("request_timeout", self.request_timeout),
            ("download_timeout", self.download_timeout),
            ("pending_auth_ttl", self.pending_auth_ttl),
            ("token_cache_ttl", self.token_cache_ttl),
            ("refresh_token_ttl", self.refresh_token_ttl),
            ("rendition_cache_ttl", self.rendition_cache_ttl),
            ("claim_lease", self.claim_lease),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
        }

        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".to_string()));
        }

        if self.page_size == 0 || self.page_size > 500 {
            return Err(Error::Config(
                "page_size must be between 1 and 500".to_string(),
            ));
        }

        if self.max_pages == 0 {
            return Err(Error::Config("max_pages must be greater than 0".to_string()));
        }

        if self.cache_namespace.is_empty()
            || self.cache_namespace.chars().any(|c| c.is_whitespace())
        {
            return Err(Error::Config(
                "cache_namespace must be non-empty and contain no whitespace".to_string(),
            ));
        }

        if self.storage.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.storage.object_store_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Object store directory cannot be empty".to_string(),
            ));
        }

        if self.storage.cache_capacity == 0 {
            return Err(Error::Config(
                "Cache capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SyncEngineConfigBuilder {
    provider: Option<ProviderSettings>,
    storage: StorageSettings,
    request_timeout: Option<Duration>,
    download_timeout: Option<Duration>,
    max_retries: Option<u32>,
    page_size: Option<u32>,
    max_pages: Option<usize>,
    pending_auth_ttl: Option<Duration>,
    token_cache_ttl: Option<Duration>,
    refresh_token_ttl: Option<Duration>,
    rendition_cache_ttl: Option<Duration>,
    claim_lease: Option<Duration>,
    cache_namespace: Option<String>,
}

impl SyncEngineConfigBuilder {
    pub fn provider(mut self, provider: ProviderSettings) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage.database_path = path.into();
        self
    }

    pub fn object_store_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.storage.object_store_dir = dir.into();
        self
    }

    pub fn object_base_url(mut self, url: impl Into<String>) -> Self {
        self.storage.object_base_url = url.into();
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.storage.cache_capacity = capacity;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = Some(attempts);
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn max_pages(mut self, pages: usize) -> Self {
        self.max_pages = Some(pages);
        self
    }

    pub fn pending_auth_ttl(mut self, ttl: Duration) -> Self {
        self.pending_auth_ttl = Some(ttl);
        self
    }

    pub fn token_cache_ttl(mut self, ttl: Duration) -> Self {
        self.token_cache_ttl = Some(ttl);
        self
    }

    pub fn refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = Some(ttl);
        self
    }

    pub fn rendition_cache_ttl(mut self, ttl: Duration) -> Self {
        self.rendition_cache_ttl = Some(ttl);
        self
    }

    pub fn claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = Some(lease);
        self
    }

    pub fn cache_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache_namespace = Some(namespace.into());
        self
    }

    pub fn build(self) -> Result<SyncEngineConfig> {
        let provider = self.provider.ok_or_else(|| {
            Error::Config(
                "Provider settings are required. Use ProviderSettings::lightroom(..) \
                 or SyncEngineConfig::from_env()."
                    .to_string(),
            )
        })?;

        let config = SyncEngineConfig {
            provider,
            storage: self.storage,
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            download_timeout: self.download_timeout.unwrap_or(Duration::from_secs(120)),
            max_retries: self.max_retries.unwrap_or(3),
            page_size: self.page_size.unwrap_or(100),
            max_pages: self.max_pages.unwrap_or(10_000),
            pending_auth_ttl: self.pending_auth_ttl.unwrap_or(Duration::from_secs(600)),
            token_cache_ttl: self.token_cache_ttl.unwrap_or(Duration::from_secs(3600)),
            refresh_token_ttl: self
                .refresh_token_ttl
                .unwrap_or(Duration::from_secs(30 * 24 * 3600)),
            rendition_cache_ttl: self
                .rendition_cache_ttl
                .unwrap_or(Duration::from_secs(24 * 3600)),
            claim_lease: self.claim_lease.unwrap_or(Duration::from_secs(15 * 60)),
            cache_namespace: self
                .cache_namespace
                .unwrap_or_else(|| "lightroom".to_string()),
        };

        config.validate()?;
        Ok(config)
    }
}
