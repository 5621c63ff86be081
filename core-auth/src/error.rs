use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Authorization code could not be exchanged for tokens.
    #[error("Authorization code exchange failed: {0}")]
    AuthExchange(String),

    #[error("Token refresh failed: {0}")]
    AuthRefresh(String),

    /// Unknown, expired or already consumed `state` parameter.
    #[error("Invalid or expired OAuth state")]
    InvalidState,

    #[error("Not connected to the photo service")]
    NotConnected,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Credential cache error: {0}")]
    Cache(String),

    #[error("Operation timed out: {operation}")]
    OperationTimeout { operation: String },

    #[error("Invalid OAuth configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// Whether the caller has to go through the authorization flow again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            AuthError::NotConnected | AuthError::AuthRefresh(_) | AuthError::InvalidState
        )
    }
}

impl From<BridgeError> for AuthError {
    fn from(err: BridgeError) -> Self {
        AuthError::Cache(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
