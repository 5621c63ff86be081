use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use provider_lightroom::LightroomError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization failed: {0}")]
    InitializationFailed(String),

    /// No usable credentials; the caller must run the authorization flow.
    #[error("Not connected to Lightroom; authorization required")]
    AuthenticationRequired,

    #[error("Authentication error: {0}")]
    Auth(AuthError),

    #[error("Provider error: {0}")]
    Provider(#[from] LightroomError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Storage error: {0}")]
    Storage(#[from] BridgeError),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),
}

impl ServiceError {
    /// The caller should send the user through authorization again.
    pub fn is_authentication_required(&self) -> bool {
        match self {
            ServiceError::AuthenticationRequired => true,
            ServiceError::Auth(e) => e.requires_reauthorization(),
            ServiceError::Provider(e) => e.is_unauthorized(),
            _ => false,
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NotConnected => ServiceError::AuthenticationRequired,
            other => ServiceError::Auth(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
