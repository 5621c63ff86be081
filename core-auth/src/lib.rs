//! # Authentication Module
//!
//! Credential lifecycle for the remote photo service.
//!
//! ## Overview
//!
//! - OAuth 2.0 authorization code flow with PKCE (S256)
//! - Single-use pending authorization sessions with a bounded lifetime
//! - Token caching with a long-lived refresh token
//! - Transparent refresh before expiry and on rejection
//! - Best-effort revocation on disconnect
//! - Auth state event emission

pub mod error;
pub mod manager;
pub mod oauth;
pub mod pending;
pub mod token_cache;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::AuthManager;
pub use oauth::{generate_state, OAuthConfig, OAuthFlowManager, PkceVerifier, TokenTypeHint};
pub use pending::{CachePendingAuthStore, InMemoryPendingAuthStore, PendingAuthStore};
pub use token_cache::TokenCache;
pub use types::{AuthStatus, AuthorizationRequest, OAuthSession, TokenSet};
