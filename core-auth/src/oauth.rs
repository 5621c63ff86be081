//! OAuth 2.0 Authorization Code Flow with PKCE
//!
//! Implements RFC 6749 and RFC 7636 against the photo service's identity
//! endpoints: authorization URL construction, code exchange, refresh,
//! revocation and token validation.
//!
//! # Security
//!
//! - Verifier and state are 32 bytes from the thread-local CSPRNG
//! - The challenge method is always S256
//! - Tokens, codes and verifiers never reach the logs
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{generate_state, OAuthConfig, OAuthFlowManager};
//! use core_runtime::config::ProviderSettings;
//! use std::sync::Arc;
//!
//! # async fn example() -> core_auth::Result<()> {
//! # use bridge_traits::http::HttpClient;
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! let settings = ProviderSettings::lightroom(
//!     "client-id",
//!     None,
//!     "https://localhost:8000/api/v1/lightroom/auth/callback",
//! );
//! let flow = OAuthFlowManager::new(OAuthConfig::from_settings(&settings), http_client);
//!
//! let state = generate_state();
//! let (auth_url, verifier) = flow.build_authorization_url(&state)?;
//! // Send the user to auth_url, keep verifier until the callback arrives...
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::TokenSet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bytes::Bytes;
use core_runtime::config::{ProviderSettings, SyncEngineConfig};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client registration and endpoints for one OAuth provider.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Absent for public clients
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    /// Account endpoint probed by [`OAuthFlowManager::validate_token`]
    pub validation_url: String,
    pub request_timeout: Duration,
    /// Applied to refresh only; code exchange is single-shot.
    pub retry: RetryPolicy,
}

impl OAuthConfig {
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            redirect_uri: settings.redirect_uri.clone(),
            scopes: settings.scopes.clone(),
            auth_url: settings.auth_url.clone(),
            token_url: settings.token_url.clone(),
            revoke_url: settings.revoke_url.clone(),
            validation_url: settings.validation_url.clone(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&SyncEngineConfig> for OAuthConfig {
    fn from(config: &SyncEngineConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            retry: RetryPolicy::default().with_max_attempts(config.max_retries),
            ..Self::from_settings(&config.provider)
        }
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// PKCE code verifier.
///
/// The verifier must be kept until the callback so it can be sent with the
/// code exchange; only its challenge goes into the authorization URL.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
}

impl PkceVerifier {
    /// Fresh verifier: 32 random bytes, base64url without padding.
    pub fn new() -> Self {
        Self {
            verifier: random_token(),
        }
    }

    /// Rebuild a verifier that was persisted with a pending session.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        Self {
            verifier: verifier.into(),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// BASE64URL(SHA256(verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PkceVerifier([REDACTED])")
    }
}

/// Unguessable `state` value for one authorization attempt.
pub fn generate_state() -> String {
    random_token()
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Which credential a revocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenTypeHint::AccessToken => "access_token",
            TokenTypeHint::RefreshToken => "refresh_token",
        }
    }
}

/// Runs the authorization-code lifecycle against the identity endpoints.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the consent URL for `state` with a fresh PKCE verifier.
    ///
    /// Fails only when the configured authorization endpoint is not a URL.
    pub fn build_authorization_url(&self, state: &str) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Config(format!("Invalid authorization URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "S256");

        debug!("Built authorization URL");
        Ok((url.to_string(), verifier))
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// [`AuthError::AuthExchange`] on a non-2xx answer, a transport failure or
    /// an unreadable token response.
    #[instrument(skip(self, code, verifier))]
    pub async fn exchange_code(&self, code: &str, verifier: &PkceVerifier) -> Result<TokenSet> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("code_verifier", verifier.verifier()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let request = self.form_request(&self.config.token_url, &params)?;
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::AuthExchange(e.to_string()))?;

        if !response.is_success() {
            let body = response.text_lossy();
            warn!(status = response.status, error = %body, "Token endpoint rejected authorization code");
            return Err(AuthError::AuthExchange(format!(
                "Token endpoint returned {}: {}",
                response.status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| AuthError::AuthExchange(format!("Malformed token response: {}", e)))?;

        info!(expires_in = token.expires_in, "Exchanged authorization code for tokens");
        token.into_token_set(None).map_err(AuthError::AuthExchange)
    }

    /// Obtain a new access token.
    ///
    /// Throttling, server errors and transport failures are retried with
    /// exponential backoff; any other 4xx fails at once. When the provider
    /// omits a new refresh token the one passed in is kept.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let policy = &self.config.retry;
        let mut attempt = 0;

        loop {
            let request = self.form_request(&self.config.token_url, &params)?;
            let failure = match self.http_client.execute(request).await {
                Ok(response) if response.is_success() => {
                    let token: TokenResponse = response.json().map_err(|e| {
                        AuthError::AuthRefresh(format!("Malformed token response: {}", e))
                    })?;
                    info!(expires_in = token.expires_in, "Refreshed access token");
                    return token
                        .into_token_set(Some(refresh_token))
                        .map_err(AuthError::AuthRefresh);
                }
                Ok(response) if !response.is_retryable() => {
                    let body = response.text_lossy();
                    warn!(status = response.status, error = %body, "Token refresh rejected");
                    return Err(AuthError::AuthRefresh(format!(
                        "Token endpoint returned {}: {}",
                        response.status, body
                    )));
                }
                Ok(response) => describe_failure(&response),
                Err(e) => e.to_string(),
            };

            attempt += 1;
            if attempt >= policy.max_attempts {
                return Err(AuthError::AuthRefresh(format!(
                    "Token refresh failed after {} attempts: {}",
                    attempt, failure
                )));
            }

            let delay = policy.delay_for(attempt - 1);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Token refresh failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Ask the provider to invalidate a token.
    ///
    /// Returns whether the provider confirmed; failures are logged and
    /// reported as `false`.
    #[instrument(skip(self, token), fields(hint = hint.as_str()))]
    pub async fn revoke_token(&self, token: &str, hint: TokenTypeHint) -> bool {
        let mut params = vec![
            ("token", token),
            ("token_type_hint", hint.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let request = match self.form_request(&self.config.revoke_url, &params) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Could not build revocation request");
                return false;
            }
        };

        match self.http_client.execute(request).await {
            Ok(response) if response.is_success() => {
                info!("Token revoked");
                true
            }
            Ok(response) => {
                warn!(status = response.status, "Token revocation rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "Token revocation failed");
                false
            }
        }
    }

    /// Whether the provider still accepts `access_token`.
    ///
    /// Only HTTP 200 counts as valid; transport failures count as invalid.
    pub async fn validate_token(&self, access_token: &str) -> bool {
        let request = HttpRequest::new(HttpMethod::Get, self.config.validation_url.clone())
            .bearer_token(access_token)
            .header("X-API-Key", self.config.client_id.clone())
            .timeout(self.config.request_timeout);

        match self.http_client.execute(request).await {
            Ok(response) => response.status == 200,
            Err(e) => {
                debug!(error = %e, "Token validation request failed");
                false
            }
        }
    }

    fn form_request(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpRequest> {
        let body = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Other(format!("Failed to encode form body: {}", e)))?;

        Ok(HttpRequest::new(HttpMethod::Post, url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Bytes::from(body))
            .timeout(self.config.request_timeout))
    }
}

fn describe_failure(response: &HttpResponse) -> String {
    format!("status {}: {}", response.status, response.text_lossy())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default, alias = "user_id")]
    account_id: Option<String>,
    #[serde(default)]
    account: Option<AccountRef>,
}

#[derive(Debug, Deserialize)]
struct AccountRef {
    id: String,
}

impl TokenResponse {
    /// Fails with a description when `expires_in` is out of range.
    fn into_token_set(
        self,
        previous_refresh: Option<&str>,
    ) -> std::result::Result<TokenSet, String> {
        let expires_in = self.expires_in;
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string));
        let account_id = self.account_id.or(self.account.map(|a| a.id));
        TokenSet::checked(self.access_token, refresh_token, expires_in, account_id)
            .ok_or_else(|| {
                format!(
                    "Malformed token response: expires_in {} out of range",
                    expires_in
                )
            })
    }
}

fn default_expires_in() -> i64 {
    3600
}
