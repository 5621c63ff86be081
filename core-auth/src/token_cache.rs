//! Cached OAuth credentials.
//!
//! The full token set lives under `<ns>:tokens:default` for the access-token
//! lifetime, the refresh token separately under `<ns>:refresh:default` for
//! much longer so an expired session can still be renewed.

use crate::error::Result;
use crate::types::TokenSet;
use bridge_traits::storage::{get_json, set_json, KeyValueCache};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const ACCOUNT_SLOT: &str = "default";

pub struct TokenCache {
    cache: Arc<dyn KeyValueCache>,
    namespace: String,
    token_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCache {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        namespace: impl Into<String>,
        token_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
            token_ttl,
            refresh_ttl,
        }
    }

    fn tokens_key(&self) -> String {
        format!("{}:tokens:{}", self.namespace, ACCOUNT_SLOT)
    }

    fn refresh_key(&self) -> String {
        format!("{}:refresh:{}", self.namespace, ACCOUNT_SLOT)
    }

    pub async fn store(&self, tokens: &TokenSet) -> Result<()> {
        set_json(self.cache.as_ref(), &self.tokens_key(), tokens, self.token_ttl).await?;

        if let Some(refresh) = &tokens.refresh_token {
            self.cache
                .set(&self.refresh_key(), refresh.clone(), self.refresh_ttl)
                .await?;
        }

        info!(
            expires_in = tokens.expires_in_seconds(),
            has_refresh_token = tokens.refresh_token.is_some(),
            "Cached OAuth tokens"
        );
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<TokenSet>> {
        match get_json::<TokenSet>(self.cache.as_ref(), &self.tokens_key()).await {
            Ok(tokens) => Ok(tokens),
            Err(bridge_traits::BridgeError::Serialization(e)) => {
                // unreadable entries are treated as absent and dropped
                warn!(error = %e, "Discarding corrupt cached tokens");
                self.cache.delete(&self.tokens_key()).await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn load_refresh_token(&self) -> Result<Option<String>> {
        Ok(self.cache.get(&self.refresh_key()).await?)
    }

    pub async fn clear(&self) -> Result<()> {
        let tokens = self.cache.delete(&self.tokens_key()).await?;
        let refresh = self.cache.delete(&self.refresh_key()).await?;
        debug!(tokens, refresh, "Cleared cached OAuth tokens");
        Ok(())
    }
}
