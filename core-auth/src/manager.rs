//! # Authentication Manager
//!
//! Caller-facing lifecycle of the connection to the photo service: start an
//! authorization, complete it from the callback, report status, hand out a
//! usable access token and disconnect.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthManager, CachePendingAuthStore, OAuthConfig, OAuthFlowManager, TokenCache};
//! use core_runtime::config::SyncEngineConfig;
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//! # use bridge_traits::{HttpClient, KeyValueCache};
//!
//! # async fn example(config: SyncEngineConfig) -> core_auth::Result<()> {
//! # let http: Arc<dyn HttpClient> = todo!();
//! # let cache: Arc<dyn KeyValueCache> = todo!();
//! let manager = AuthManager::new(
//!     OAuthFlowManager::new(OAuthConfig::from(&config), http),
//!     Arc::new(CachePendingAuthStore::new(cache.clone(), "lightroom", config.pending_auth_ttl)),
//!     TokenCache::new(cache, "lightroom", config.token_cache_ttl, config.refresh_token_ttl),
//!     EventBus::default(),
//! );
//!
//! let request = manager.begin_authorization().await?;
//! println!("Visit: {}", request.auth_url);
//! // ... callback arrives with code + state
//! let tokens = manager.complete_authorization("code", &request.state).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::oauth::{generate_state, OAuthFlowManager, PkceVerifier, TokenTypeHint};
use crate::pending::PendingAuthStore;
use crate::token_cache::TokenCache;
use crate::types::{AuthStatus, AuthorizationRequest, OAuthSession, TokenSet};
use chrono::Utc;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

/// Upper bound for a single exchange or refresh round trip, retries included
const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// Tokens this close to expiry are refreshed before use
const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(300);

const PROVIDER: &str = "lightroom";

pub struct AuthManager {
    oauth: OAuthFlowManager,
    pending: Arc<dyn PendingAuthStore>,
    tokens: TokenCache,
    event_bus: EventBus,
    /// Serializes refreshes so concurrent callers reuse one new token
    refresh_lock: Mutex<()>,
}

impl AuthManager {
    pub fn new(
        oauth: OAuthFlowManager,
        pending: Arc<dyn PendingAuthStore>,
        tokens: TokenCache,
        event_bus: EventBus,
    ) -> Self {
        Self {
            oauth,
            pending,
            tokens,
            event_bus,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Issue an authorization URL bound to a fresh single-use state.
    #[instrument(skip(self))]
    pub async fn begin_authorization(&self) -> Result<AuthorizationRequest> {
        let state = generate_state();
        let (auth_url, verifier) = self.oauth.build_authorization_url(&state)?;

        self.pending
            .insert(OAuthSession::new(
                state.clone(),
                verifier.verifier().to_string(),
                Utc::now(),
            ))
            .await?;

        self.emit(AuthEvent::AuthorizationStarted {
            provider: PROVIDER.to_string(),
        });

        info!("Authorization flow started");
        Ok(AuthorizationRequest { auth_url, state })
    }

    /// Finish the flow started by [`begin_authorization`](Self::begin_authorization).
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidState`] for an unknown, expired or reused state
    /// - [`AuthError::AuthExchange`] when the provider rejects the code
    /// - [`AuthError::OperationTimeout`] when the exchange does not finish in time
    #[instrument(skip(self, code, state))]
    pub async fn complete_authorization(&self, code: &str, state: &str) -> Result<TokenSet> {
        let Some(session) = self.pending.take(state).await? else {
            warn!("Callback with unknown or expired state");
            self.emit_error("Invalid or expired state parameter", false);
            return Err(AuthError::InvalidState);
        };

        let verifier = PkceVerifier::from_verifier(session.code_verifier);
        let tokens = self
            .bounded("token exchange", self.oauth.exchange_code(code, &verifier))
            .await
            .inspect_err(|e| {
                error!(error = %e, "Authorization code exchange failed");
                self.emit_error(&e.to_string(), true);
            })?;

        self.tokens.store(&tokens).await?;

        self.emit(AuthEvent::Connected {
            provider: PROVIDER.to_string(),
            account_id: tokens.account_id.clone(),
        });
        info!("Connected to photo service");
        Ok(tokens)
    }

    /// Report whether usable credentials exist.
    ///
    /// A locally expired token, or one the provider no longer accepts, is
    /// refreshed and re-cached on the way. A failed refresh reports
    /// disconnected rather than an error.
    #[instrument(skip(self))]
    pub async fn status(&self) -> Result<AuthStatus> {
        let _guard = self.refresh_lock.lock().await;

        let cached = self.tokens.load().await?;
        if let Some(tokens) = &cached {
            if !tokens.is_expired() && self.oauth.validate_token(&tokens.access_token).await {
                return Ok(AuthStatus::connected(tokens.account_id.clone()));
            }
            debug!("Cached access token is expired or rejected");
        }

        let Some(refresh_token) = self.refresh_token_for(cached.as_ref()).await? else {
            return Ok(AuthStatus::disconnected());
        };

        let account_id = cached.and_then(|t| t.account_id);
        match self.refresh(&refresh_token, account_id).await {
            Ok(tokens) => Ok(AuthStatus::connected(tokens.account_id)),
            Err(AuthError::Cache(msg)) => Err(AuthError::Cache(msg)),
            Err(e) => {
                warn!(error = %e, "Refresh failed while checking status");
                Ok(AuthStatus::disconnected())
            }
        }
    }

    /// Access token good for at least the refresh buffer, refreshing if needed.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotConnected`] when nothing usable is cached.
    #[instrument(skip(self))]
    pub async fn valid_token(&self) -> Result<TokenSet> {
        let _guard = self.refresh_lock.lock().await;

        let cached = self.tokens.load().await?;
        if let Some(tokens) = &cached {
            if !tokens.is_expired_with_buffer(TOKEN_REFRESH_BUFFER.as_secs() as i64) {
                debug!("Cached token is valid, no refresh needed");
                return Ok(tokens.clone());
            }
        }

        let Some(refresh_token) = self.refresh_token_for(cached.as_ref()).await? else {
            return match cached {
                Some(tokens) if !tokens.is_expired() => Ok(tokens),
                _ => Err(AuthError::NotConnected),
            };
        };

        info!("Token expired or expiring soon, refreshing");
        let account_id = cached.as_ref().and_then(|t| t.account_id.clone());
        match self.refresh(&refresh_token, account_id).await {
            Ok(tokens) => Ok(tokens),
            Err(e) => match cached {
                Some(tokens) if !tokens.is_expired() => {
                    warn!(error = %e, "Refresh failed, using token until it expires");
                    Ok(tokens)
                }
                _ => Err(e),
            },
        }
    }

    /// Revoke what can be revoked and forget all cached credentials.
    ///
    /// Revocation is best-effort; the cache is cleared regardless.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let cached = self.tokens.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read cached tokens before disconnect");
            None
        });
        let refresh_token = match self.refresh_token_for(cached.as_ref()).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not read cached refresh token before disconnect");
                None
            }
        };

        if let Some(tokens) = &cached {
            self.oauth
                .revoke_token(&tokens.access_token, TokenTypeHint::AccessToken)
                .await;
        }
        if let Some(refresh_token) = &refresh_token {
            self.oauth
                .revoke_token(refresh_token, TokenTypeHint::RefreshToken)
                .await;
        }

        self.tokens.clear().await?;

        self.emit(AuthEvent::Disconnected {
            provider: PROVIDER.to_string(),
        });
        info!("Disconnected from photo service");
        Ok(())
    }

    async fn refresh_token_for(&self, cached: Option<&TokenSet>) -> Result<Option<String>> {
        match cached.and_then(|t| t.refresh_token.clone()) {
            Some(token) => Ok(Some(token)),
            None => self.tokens.load_refresh_token().await,
        }
    }

    /// Caller holds `refresh_lock`.
    async fn refresh(&self, refresh_token: &str, account_id: Option<String>) -> Result<TokenSet> {
        let mut tokens = self
            .bounded(
                "token refresh",
                self.oauth.refresh_access_token(refresh_token),
            )
            .await
            .inspect_err(|e| {
                error!(error = %e, "Token refresh failed");
                self.emit_error(&format!("Token refresh failed: {}", e), true);
            })?;

        if tokens.account_id.is_none() {
            tokens.account_id = account_id;
        }
        self.tokens.store(&tokens).await?;

        self.emit(AuthEvent::TokenRefreshed {
            provider: PROVIDER.to_string(),
            expires_at: tokens.expires_at.timestamp(),
        });
        Ok(tokens)
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match timeout(DEFAULT_AUTH_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::OperationTimeout {
                operation: operation.to_string(),
            }),
        }
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }

    fn emit_error(&self, message: &str, recoverable: bool) {
        self.emit(AuthEvent::AuthError {
            provider: PROVIDER.to_string(),
            message: message.to_string(),
            recoverable,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::OAuthConfig;
    use crate::pending::InMemoryPendingAuthStore;
    use bridge_desktop::InMemoryCache;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
    use bridge_traits::KeyValueCache;
    use bytes::Bytes;
    use core_runtime::config::ProviderSettings;
    use std::collections::HashMap;
    use url::Url;

    mockall::mock! {
        Http {}

        #[async_trait::async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn grant(req: &HttpRequest) -> Option<String> {
        let body = req.body.clone()?;
        let form: HashMap<String, String> = serde_urlencoded::from_bytes(&body).ok()?;
        form.get("grant_type").cloned()
    }

    fn is_validation(req: &HttpRequest) -> bool {
        req.method == HttpMethod::Get && req.url.ends_with("/account")
    }

    struct Harness {
        manager: AuthManager,
        cache: Arc<InMemoryCache>,
        events: tokio::sync::broadcast::Receiver<CoreEvent>,
    }

    fn harness(http: MockHttp) -> Harness {
        let settings = ProviderSettings::lightroom("client", None, "https://localhost/cb");
        let config = OAuthConfig {
            retry: RetryPolicy::none(),
            ..OAuthConfig::from_settings(&settings)
        };
        let cache = Arc::new(InMemoryCache::new(64));
        let bus = EventBus::new(32);
        let events = bus.subscribe();
        let manager = AuthManager::new(
            OAuthFlowManager::new(config, Arc::new(http)),
            Arc::new(InMemoryPendingAuthStore::new(std::time::Duration::from_secs(600))),
            TokenCache::new(
                cache.clone(),
                "lightroom",
                std::time::Duration::from_secs(3600),
                std::time::Duration::from_secs(30 * 86_400),
            ),
            bus,
        );
        Harness {
            manager,
            cache,
            events,
        }
    }

    fn expired(access: &str, refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Utc::now() - chrono::Duration::minutes(1),
            account_id: Some("acct-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_state_is_single_use() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| grant(req).as_deref() == Some("authorization_code"))
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"access_token":"at","refresh_token":"rt","expires_in":3600}"#,
                ))
            });
        let mut h = harness(http);

        let request = h.manager.begin_authorization().await.unwrap();
        let query: HashMap<_, _> = Url::parse(&request.auth_url)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect();
        assert_eq!(query["state"], request.state);

        let tokens = h
            .manager
            .complete_authorization("code", &request.state)
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at");

        let replay = h.manager.complete_authorization("code", &request.state).await;
        assert!(matches!(replay, Err(AuthError::InvalidState)));

        assert!(matches!(
            h.events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::AuthorizationStarted { .. })
        ));
        assert!(matches!(
            h.events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::Connected { .. })
        ));
        assert!(matches!(
            h.events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::AuthError { recoverable: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_state_never_reaches_provider() {
        let h = harness(MockHttp::new());
        let result = h.manager.complete_authorization("code", "forged").await;
        assert!(matches!(result, Err(AuthError::InvalidState)));
    }

    #[tokio::test]
    async fn test_status_without_credentials() {
        let h = harness(MockHttp::new());
        assert_eq!(h.manager.status().await.unwrap(), AuthStatus::disconnected());
        assert!(matches!(
            h.manager.valid_token().await,
            Err(AuthError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_status_refreshes_expired_token() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| grant(req).as_deref() == Some("refresh_token"))
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"at-2","expires_in":3600}"#)));
        let h = harness(http);
        h.manager
            .tokens
            .store(&expired("at-1", Some("rt")))
            .await
            .unwrap();

        let status = h.manager.status().await.unwrap();
        assert_eq!(status, AuthStatus::connected(Some("acct-1".to_string())));

        let cached = h.manager.tokens.load().await.unwrap().unwrap();
        assert_eq!(cached.access_token, "at-2");
        assert_eq!(cached.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn test_status_refreshes_rejected_token() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(is_validation)
            .times(1)
            .returning(|_| Ok(response(401, "")));
        http.expect_execute()
            .withf(|req| grant(req).as_deref() == Some("refresh_token"))
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"at-2"}"#)));
        let h = harness(http);
        h.manager
            .tokens
            .store(&TokenSet::new("revoked".into(), Some("rt".into()), 3600, None))
            .await
            .unwrap();

        assert!(h.manager.status().await.unwrap().connected);
    }

    #[tokio::test]
    async fn test_status_refresh_from_refresh_token_only() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| grant(req).as_deref() == Some("refresh_token"))
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"at-3"}"#)));
        let h = harness(http);
        h.cache
            .set(
                "lightroom:refresh:default",
                "rt".to_string(),
                std::time::Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert!(h.manager.status().await.unwrap().connected);
        assert_eq!(h.manager.valid_token().await.unwrap().access_token, "at-3");
    }

    #[tokio::test]
    async fn test_status_disconnected_when_refresh_fails() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(400, r#"{"error":"invalid_grant"}"#)));
        let h = harness(http);
        h.manager
            .tokens
            .store(&expired("at", Some("rt")))
            .await
            .unwrap();

        assert_eq!(h.manager.status().await.unwrap(), AuthStatus::disconnected());
    }

    #[tokio::test]
    async fn test_valid_token_refreshes_inside_buffer() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"fresh","expires_in":3600}"#)));
        let h = harness(http);
        let mut soon = expired("stale", Some("rt"));
        soon.expires_at = Utc::now() + chrono::Duration::minutes(2);
        h.manager.tokens.store(&soon).await.unwrap();

        let tokens = h.manager.valid_token().await.unwrap();
        assert_eq!(tokens.access_token, "fresh");
        // second call is served from cache
        assert_eq!(h.manager.valid_token().await.unwrap().access_token, "fresh");
    }

    #[tokio::test]
    async fn test_disconnect_clears_even_when_revoke_fails() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(2)
            .returning(|_| Err(BridgeError::OperationFailed("offline".to_string())));
        let mut h = harness(http);
        h.manager
            .tokens
            .store(&TokenSet::new("at".into(), Some("rt".into()), 3600, None))
            .await
            .unwrap();

        h.manager.disconnect().await.unwrap();

        assert!(h.manager.tokens.load().await.unwrap().is_none());
        assert!(h.manager.tokens.load_refresh_token().await.unwrap().is_none());
        assert!(matches!(
            h.events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::Disconnected { .. })
        ));
    }
}
