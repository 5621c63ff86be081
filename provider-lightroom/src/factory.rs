//! Builds [`CatalogClient`]s for freshly validated credentials.

use bridge_traits::http::HttpClient;
use core_auth::TokenSet;
use std::sync::Arc;
use tracing::debug;

use crate::connector::{CatalogClient, CatalogClientConfig};

/// Shares one HTTP client and one connection config across every
/// [`CatalogClient`] it creates.
#[derive(Clone)]
pub struct CatalogClientFactory {
    http_client: Arc<dyn HttpClient>,
    config: CatalogClientConfig,
}

impl CatalogClientFactory {
    pub fn new(http_client: Arc<dyn HttpClient>, config: CatalogClientConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    pub fn config(&self) -> &CatalogClientConfig {
        &self.config
    }

    /// Client bound to `tokens.access_token`. The caller is responsible for
    /// handing in a token that is still valid.
    pub fn for_tokens(&self, tokens: &TokenSet) -> CatalogClient {
        debug!(
            account_id = tokens.account_id.as_deref().unwrap_or("unknown"),
            expires_in = tokens.expires_in_seconds(),
            "Creating catalog client"
        );
        CatalogClient::new(
            Arc::clone(&self.http_client),
            &tokens.access_token,
            self.config.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHttp {
        auth_headers: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for RecordingHttp {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            self.auth_headers
                .lock()
                .unwrap()
                .push(request.headers["Authorization"].clone());
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from_static(br#"{"id":"acct-1"}"#),
            })
        }
    }

    #[tokio::test]
    async fn test_each_client_carries_its_own_token() {
        let http = Arc::new(RecordingHttp::default());
        let factory = CatalogClientFactory::new(
            http.clone(),
            CatalogClientConfig::lightroom("client-id").unwrap(),
        );

        let first = factory.for_tokens(&TokenSet::new("tok-1".to_string(), None, 3600, None));
        let second = factory.for_tokens(&TokenSet::new("tok-2".to_string(), None, 3600, None));
        first.get_account().await.unwrap();
        second.get_account().await.unwrap();

        first.close();
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(
            *http.auth_headers.lock().unwrap(),
            vec!["Bearer tok-1".to_string(), "Bearer tok-2".to_string()]
        );
    }
}
