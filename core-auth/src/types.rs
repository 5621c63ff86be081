//! Credential value types shared by the OAuth flow, the token cache and the
//! auth manager.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access credentials returned by a code exchange or a refresh.
///
/// # Examples
///
/// ```
/// use core_auth::TokenSet;
///
/// let tokens = TokenSet::new("access".to_string(), Some("refresh".to_string()), 3600, None);
/// assert!(!tokens.is_expired());
/// assert!(!format!("{:?}", tokens).contains("access"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl TokenSet {
    /// `expires_in` is relative to now, in seconds. Lifetimes outside the
    /// representable range saturate; use [`TokenSet::checked`] for values
    /// coming off the wire.
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        account_id: Option<String>,
    ) -> Self {
        let expires_at = expires_at_after(expires_in).unwrap_or(if expires_in < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
        Self {
            access_token,
            refresh_token,
            expires_at,
            account_id,
        }
    }

    /// As [`TokenSet::new`], but `None` when `expires_in` is negative or the
    /// resulting expiry is not representable.
    pub fn checked(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        account_id: Option<String>,
    ) -> Option<Self> {
        if expires_in < 0 {
            return None;
        }
        Some(Self {
            access_token,
            refresh_token,
            expires_at: expires_at_after(expires_in)?,
            account_id,
        })
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_with_buffer(0)
    }

    /// True when the token expires within `buffer_seconds` from now.
    pub fn is_expired_with_buffer(&self, buffer_seconds: i64) -> bool {
        let deadline = Duration::try_seconds(buffer_seconds)
            .and_then(|buffer| self.expires_at.checked_sub_signed(buffer))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Utc::now() >= deadline
    }

    /// Seconds until expiry, clamped at zero.
    pub fn expires_in_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

fn expires_at_after(expires_in: i64) -> Option<DateTime<Utc>> {
    Utc::now().checked_add_signed(Duration::try_seconds(expires_in)?)
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Authorization attempt awaiting its callback.
///
/// Lives in a [`PendingAuthStore`](crate::PendingAuthStore) keyed by `state`
/// and is consumed exactly once.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthSession {
    pub state: String,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
}

impl OAuthSession {
    pub fn new(state: String, code_verifier: String, created_at: DateTime<Utc>) -> Self {
        Self {
            state,
            code_verifier,
            created_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now >= self.created_at + ttl
    }
}

impl fmt::Debug for OAuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSession")
            .field("state", &self.state)
            .field("code_verifier", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// What the caller needs to send the user to the provider's consent page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub auth_url: String,
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl AuthStatus {
    pub fn connected(account_id: Option<String>) -> Self {
        Self {
            connected: true,
            account_id,
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expiry_buffer() {
        let tokens = TokenSet {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::minutes(4),
            account_id: None,
        };
        assert!(!tokens.is_expired());
        assert!(tokens.is_expired_with_buffer(300));
        assert!(tokens.expires_in_seconds() > 200);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let tokens = TokenSet::new(
            "secret-access".to_string(),
            Some("secret-refresh".to_string()),
            60,
            Some("acct-1".to_string()),
        );
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("acct-1"));

        let session = OAuthSession::new("st".to_string(), "verifier-xyz".to_string(), Utc::now());
        assert!(!format!("{:?}", session).contains("verifier-xyz"));
    }

    #[test]
    fn test_out_of_range_lifetime_is_rejected() {
        assert!(TokenSet::checked("a".to_string(), None, i64::MAX, None).is_none());
        assert!(TokenSet::checked("a".to_string(), None, -5, None).is_none());
        assert!(TokenSet::checked("a".to_string(), None, 3600, None).is_some());

        let saturated = TokenSet::new("a".to_string(), None, 9_000_000_000_000_000_000, None);
        assert_eq!(saturated.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(!saturated.is_expired_with_buffer(300));
        assert!(saturated.is_expired_with_buffer(i64::MAX));
    }

    #[test]
    fn test_token_set_serde_skips_missing_fields() {
        let tokens = TokenSet::new("a".to_string(), None, 60, None);
        let json = serde_json::to_value(&tokens).unwrap();
        assert!(json.get("refresh_token").is_none());

        let decoded: TokenSet = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, tokens);
    }

    #[test]
    fn test_session_expiry() {
        let created = Utc::now();
        let session = OAuthSession::new("s".to_string(), "v".to_string(), created);
        let ttl = Duration::minutes(10);
        assert!(!session.is_expired(created + Duration::minutes(9), ttl));
        assert!(session.is_expired(created + Duration::minutes(10), ttl));
    }
}
